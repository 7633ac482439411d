//! 单个练习会话处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责一个练习会话（一个 TOML 文件，固定 5 轮）的评分。
//!
//! ## 核心功能
//!
//! 1. **逐轮评分**：按顺序把每一轮交给 `GradingPipeline`
//! 2. **构建记录**：每轮一个 Attempt，全部完成后汇总成 Session
//! 3. **写入存储**：5 轮都成功才写入，不留下半个会话
//! 4. **统计输出**：记录会话分数和常见失败标签

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};

use crate::config::Config;
use crate::models::attempt::{Attempt, AttemptMeta, Session};
use crate::models::practice::PracticeSession;
use crate::services::prompt_presets::DEFAULT_MARKET;
use crate::store::AttemptStore;
use crate::utils::logging::truncate_text;
use crate::workflow::GradingPipeline;

/// 单个会话的处理结果
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: Session,
    pub attempts: Vec<Attempt>,
}

/// 处理单个练习会话
///
/// # 参数
/// - `pipeline`: 评分流水线
/// - `store`: 记录存储
/// - `practice`: 练习数据
/// - `session_index`: 会话索引（用于日志）
/// - `config`: 配置
///
/// # 返回
/// 任意一轮评分失败时整个会话失败，错误原样向上传递
pub async fn process_session(
    pipeline: &GradingPipeline,
    store: &dyn AttemptStore,
    practice: PracticeSession,
    session_index: usize,
    config: &Config,
) -> Result<SessionOutcome> {
    let started_at = Utc::now().to_rfc3339();
    let total_rounds = practice.rounds.len();
    let market = practice
        .market
        .clone()
        .unwrap_or_else(|| {
            if config.default_market.is_empty() {
                DEFAULT_MARKET.to_string()
            } else {
                config.default_market.clone()
            }
        });

    log_session_start(session_index, &practice, total_rounds);

    let mut attempts = Vec::with_capacity(total_rounds);

    // ========== 逐轮评分（严格串行） ==========
    for (index, round) in practice.rounds.iter().enumerate() {
        let round_number = index + 1;
        let request = practice
            .grade_request(index, &config.team_id)
            .with_context(|| format!("第 {} 轮不存在", round_number))?
            .with_market(&market);

        if config.verbose_logging {
            info!(
                "[会话 {}] 第 {}/{} 轮 · 异议: {} · 回答: {}",
                session_index,
                round_number,
                total_rounds,
                truncate_text(&round.objection, 40),
                truncate_text(&round.response, 60)
            );
        }

        let grade = pipeline.grade(&request).await.map_err(|e| {
            error!(
                "[会话 {}] 第 {} 轮评分失败: {}",
                session_index, round_number, e
            );
            if let Some(raw) = e.raw_output() {
                error!("[会话 {}] 原始输出: {}", session_index, truncate_text(raw, 300));
            }
            e
        })?;

        info!(
            "[会话 {}] ✓ 第 {}/{} 轮: {} 分 ({})",
            session_index,
            round_number,
            total_rounds,
            grade.overall_score,
            grade.primary_failure.code
        );

        let meta = AttemptMeta {
            team_id: config.team_id.clone(),
            rep_id: practice.rep_id.clone(),
            rep_name: practice.rep_name.clone(),
            market: market.clone(),
            scenario_id: round.scenario_id.clone(),
            duration_sec: round.duration_sec,
        };
        attempts.push(Attempt::from_grade(meta, &grade));
    }

    // ========== 汇总并写入 ==========
    let session = Session::from_attempts(started_at, &attempts)?;

    for attempt in &attempts {
        store.append_attempt(attempt.clone()).await?;
    }
    store.append_session(session.clone()).await?;

    log_session_complete(session_index, &session);

    Ok(SessionOutcome { session, attempts })
}

// ========== 日志辅助函数 ==========

fn log_session_start(session_index: usize, practice: &PracticeSession, total_rounds: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "[会话 {}] 📝 开始评分: {} ({}) · 共 {} 轮",
        session_index, practice.rep_name, practice.rep_id, total_rounds
    );
    if let Some(path) = &practice.file_path {
        info!("[会话 {}] 📄 文件: {}", session_index, path);
    }
}

fn log_session_complete(session_index: usize, session: &Session) {
    let tags = session
        .top_fail_tags
        .iter()
        .map(|t| format!("{}×{}", t.tag, t.count))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "[会话 {}] ✅ 会话完成: {} 分 · 常见问题: {}",
        session_index,
        session.session_score,
        if tags.is_empty() { "无" } else { tags.as_str() }
    );
}
