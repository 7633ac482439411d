//! # Objection Coach
//!
//! 上门销售异议处理练习的评分与教练系统
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础层
//! - `config` - 默认值 + 环境变量 / TOML 配置
//! - `error` - 错误分类（配置 / 输入 / 模型输出 / 瞬时 / 权限）
//! - `utils::logging` - tracing 初始化和日志辅助函数
//!
//! ### ② 数据层（Models）
//! - `models::rubric` - 固定 6 维度的评分细则和硬上限
//! - `models::grade` - GradeResult 及 Coach 补丁的纯函数合并
//! - `models::attempt` - 只追加的 Attempt / Session 记录
//! - `models::practice` + `models::loaders` - 练习文件格式与加载
//!
//! ### ③ 业务能力层（Services）
//! - `StructuredGenerator` / `LlmService` - 按 schema 生成结构化输出
//! - `OutputSchema` - JSON Schema 校验
//! - `PresetSource` - 市场提示词预设
//! - `coaching` / `metrics` - 纯函数的教练建议和指标汇总
//!
//! ### ④ 流程层（Workflow）
//! - `GradingPipeline` - Judge → 硬上限 → 总分 → Coach → 合并 → 校验
//!
//! ### ⑤ 协作方（Store / Access）
//! - `store` - Attempt / Session 存储（内存、JSON 文件）
//! - `access` - 身份解析与团队权限
//!
//! ### ⑥ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量会话评分，管理并发和报告
//! - `orchestrator/session_processor` - 单个 5 轮会话

pub mod access;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use access::{IdentityResolver, Role, TeamAccess, TeamMember, TokenIdentityResolver};
pub use config::Config;
pub use error::{AppError, AppResult, GradingStage};
pub use models::{Attempt, GradeRequest, GradeResult, PracticeSession, Rubric, Session};
pub use orchestrator::{App, RunReport};
pub use services::{
    build_coaching_plans, build_insights, build_rep_rows, build_summary, build_trend,
    CoachingPlan, LlmService, OutputSchema, PresetSource, PromptSpec, StructuredGenerator,
};
pub use store::{AttemptStore, JsonFileStore, MemoryStore};
pub use workflow::GradingPipeline;
