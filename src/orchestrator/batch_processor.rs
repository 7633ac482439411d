//! 批量练习评分器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量练习会话的评分和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建 LLM 服务、预设来源、存储
//! 2. **批量加载**：扫描并加载所有练习文件（`Vec<PracticeSession>`）
//! 3. **并发控制**：使用 Semaphore 限制同时评分的会话数量
//! 4. **分批处理**：每批完成后再开始下一批
//! 5. **经理报告**：全部完成后输出汇总、趋势、销售排行和教练建议
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单轮评分的细节
//! - **资源所有者**：唯一持有流水线和存储句柄的模块
//! - **向下委托**：委托 session_processor 处理单个会话

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::loaders::load_all_practice_files;
use crate::models::practice::PracticeSession;
use crate::orchestrator::session_processor;
use crate::services::llm_service::{LlmService, StructuredGenerator};
use crate::services::metrics::{
    build_insights, build_rep_rows, build_summary, build_trend, ManagerInsights,
};
use crate::services::prompt_presets::{preset_source_from_config, PresetSource};
use crate::store::{AttemptStore, JsonFileStore};
use crate::utils::logging::{
    log_batch_complete, log_batch_start, log_sessions_loaded, log_startup, print_final_stats,
};
use crate::workflow::GradingPipeline;

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Arc<GradingPipeline>,
    store: Arc<dyn AttemptStore>,
}

/// 一次运行的结果
#[derive(Debug, Default)]
pub struct RunReport {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub insights: Option<ManagerInsights>,
}

impl App {
    /// 初始化应用：缺少凭据时在这里直接失败
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config.llm_model_name, config.max_concurrent_sessions);

        let generator: Arc<dyn StructuredGenerator> = Arc::new(LlmService::new(&config)?);
        let presets: Arc<dyn PresetSource> = Arc::from(preset_source_from_config(&config));
        let store: Arc<dyn AttemptStore> = Arc::new(JsonFileStore::new(&config.data_file));

        Self::with_components(config, generator, presets, store)
    }

    /// 使用外部提供的组件构建（测试或嵌入场景）
    ///
    /// 配置了 `rubric_file` 时在这里加载并校验
    pub fn with_components(
        config: Config,
        generator: Arc<dyn StructuredGenerator>,
        presets: Arc<dyn PresetSource>,
        store: Arc<dyn AttemptStore>,
    ) -> Result<Self> {
        let pipeline = Arc::new(GradingPipeline::from_config(generator, presets, &config)?);
        Ok(Self {
            config,
            pipeline,
            store,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunReport> {
        // 加载所有待评分的练习
        let all_sessions = self.load_sessions().await?;

        if all_sessions.is_empty() {
            warn!("⚠️ 没有找到待评分的练习文件，程序结束");
            return Ok(RunReport::default());
        }

        log_sessions_loaded(all_sessions.len(), self.max_concurrent());

        // 处理所有会话
        let mut report = self.process_all_sessions(all_sessions).await?;

        // 经理报告
        report.insights = Some(self.report().await?);

        print_final_stats(report.success, report.failed, report.total, &self.config.data_file);

        Ok(report)
    }

    fn max_concurrent(&self) -> usize {
        self.config.max_concurrent_sessions.max(1)
    }

    /// 加载练习
    async fn load_sessions(&self) -> Result<Vec<PracticeSession>> {
        info!("\n📁 正在扫描待评分的练习...");
        load_all_practice_files(&self.config.practice_folder).await
    }

    /// 处理所有会话
    async fn process_all_sessions(&self, all_sessions: Vec<PracticeSession>) -> Result<RunReport> {
        let max_concurrent = self.max_concurrent();
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let total = all_sessions.len();
        let mut report = RunReport {
            total,
            ..Default::default()
        };

        // 分批处理
        let total_batches = total.div_ceil(max_concurrent);
        for (batch_idx, batch) in all_sessions.chunks(max_concurrent).enumerate() {
            let batch_start = batch_idx * max_concurrent;
            let batch_num = batch_idx + 1;

            log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let (success, failed) = self
                .process_batch(batch, batch_start, semaphore.clone())
                .await?;

            report.success += success;
            report.failed += failed;

            log_batch_complete(batch_num, success, success + failed);
        }

        Ok(report)
    }

    /// 处理单个批次，返回 (成功, 失败)
    async fn process_batch(
        &self,
        batch: &[PracticeSession],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<(usize, usize)> {
        let mut handles = Vec::new();

        // 为本批创建并发任务
        for (idx, practice) in batch.iter().enumerate() {
            let session_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let pipeline = self.pipeline.clone();
            let store = self.store.clone();
            let config = self.config.clone();
            let practice = practice.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                session_processor::process_session(
                    &pipeline,
                    store.as_ref(),
                    practice,
                    session_index,
                    &config,
                )
                .await
            });
            handles.push((session_index, handle));
        }

        // 等待本批所有任务完成
        let mut success = 0;
        let mut failed = 0;
        let results = futures::future::join_all(
            handles.into_iter().map(|(index, handle)| async move { (index, handle.await) }),
        )
        .await;

        for (session_index, result) in results {
            match result {
                Ok(Ok(_)) => success += 1,
                Ok(Err(e)) => {
                    error!("[会话 {}] ❌ 评分失败: {:#}", session_index, e);
                    failed += 1;
                }
                Err(e) => {
                    error!("[会话 {}] 任务执行失败: {}", session_index, e);
                    failed += 1;
                }
            }
        }

        Ok((success, failed))
    }

    /// 基于存储中的全部记录生成经理报告
    pub async fn report(&self) -> Result<ManagerInsights> {
        let attempts = self.store.list_attempts(&self.config.team_id).await?;

        let summary = build_summary(&attempts);
        info!("\n{}", "=".repeat(60));
        info!("📈 团队汇总 ({})", self.config.team_id);
        info!(
            "练习次数: {} · 活跃销售: {} · 平均分: {:.1} · 准备度: {}",
            summary.total_attempts, summary.active_reps, summary.avg_score, summary.readiness
        );
        info!(
            "分数分布: 0-49 {} · 50-69 {} · 70-84 {} · 85-100 {}",
            summary.score_buckets.low,
            summary.score_buckets.developing,
            summary.score_buckets.solid,
            summary.score_buckets.strong
        );

        for point in build_trend(&attempts) {
            info!("  {} → {:.1}", point.day, point.avg_score);
        }

        info!("🏅 销售排行");
        for row in build_rep_rows(&attempts) {
            info!(
                "  {} · {} 次 · 均分 {:.1} · 最近 {} ({:+}) · 主要问题: {}",
                row.rep_name,
                row.attempts,
                row.avg_score,
                row.last_score,
                row.trend,
                row.top_issue.as_deref().unwrap_or("-")
            );
        }

        let insights =
            build_insights(&self.config.team_id, &attempts, self.config.coaching_window)?;
        info!("🎯 本周行动");
        for action in &insights.actions {
            info!("  {}: {} {}", action.rep_name, action.recommendation, action.goal);
        }
        info!("{}", "=".repeat(60));

        Ok(insights)
    }
}
