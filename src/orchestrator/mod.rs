//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量练习评分器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载练习文件（Vec<PracticeSession>）
//! - 控制并发数量（Semaphore）
//! - 输出全局统计和经理报告
//!
//! ### `session_processor` - 单个会话处理器
//! - 逐轮调用 GradingPipeline（Judge → Coach）
//! - 构建 Attempt / Session 并写入存储
//! - 输出单个会话的统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PracticeSession>)
//!     ↓
//! session_processor (处理 5 轮)
//!     ↓
//! workflow::GradingPipeline (处理单轮)
//!     ↓
//! services (能力层：llm / schema / presets / coaching / metrics)
//! ```

pub mod batch_processor;
pub mod session_processor;

// 重新导出主要类型
pub use batch_processor::{App, RunReport};
pub use session_processor::{process_session, SessionOutcome};
