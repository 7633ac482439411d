//! 评分流程 - 流程层
//!
//! 核心职责：定义"一轮回答"的完整评分流程
//!
//! 流程顺序：
//! 1. 输入校验（任何 LLM 调用之前）
//! 2. Judge：低温度打分，schema 校验后得到不可变的 Judge 记录
//! 3. 硬上限收紧 + 重新计算总分
//! 4. Coach：高温度改写，只产出 `CoachPatch`
//! 5. 纯函数合并，最终 schema 校验
//!
//! 两个阶段严格串行，不做重试；重试由调用方根据 `AppError::is_retryable` 决定。

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, GradingStage};
use crate::models::grade::{merge_coach_patch, CoachPatch, GradeRequest, GradeResult, PointLoss};
use crate::models::rubric::{CapTrigger, Dimension, HardCap, Rubric};
use crate::services::llm_service::StructuredGenerator;
use crate::services::prompt_presets::{PresetSource, PromptPreset};
use crate::services::schema::{coach_patch_schema, grade_result_schema, OutputSchema};
use crate::utils::logging::truncate_text;
use crate::workflow::prompts::{coach_prompt, judge_prompt};

/// 一次硬上限收紧
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapAdjustment {
    pub dimension: Dimension,
    pub from: u8,
    pub to: u8,
    pub rule: String,
}

/// 对 Judge 记录应用硬上限
///
/// 只处理能从 behavior_checks 观察到的规则；"啰嗦"规则没有对应字段，保持为提示。
/// 被收紧的维度同步更新 point_losses。
pub fn enforce_hard_caps(
    caps: &[HardCap],
    grade: &GradeResult,
) -> (GradeResult, Vec<CapAdjustment>) {
    let mut scores = grade.dimension_scores;
    let mut point_losses = grade.point_losses.clone();
    let mut adjustments = Vec::new();

    for cap in caps {
        let CapTrigger::Missing(check) = cap.trigger else {
            continue;
        };
        if grade.behavior_checks.get(check) {
            continue;
        }

        let current = scores.get(cap.dimension);
        if current <= cap.max {
            continue;
        }

        scores = scores.with(cap.dimension, cap.max);
        let lost = Dimension::MAX_SCORE - cap.max;
        match point_losses.iter_mut().find(|p| p.dimension == cap.dimension) {
            Some(loss) => loss.lost = loss.lost.max(lost),
            None => point_losses.push(PointLoss {
                dimension: cap.dimension,
                lost,
                reason: format!("Hard cap: {}", cap.describe()),
            }),
        }

        adjustments.push(CapAdjustment {
            dimension: cap.dimension,
            from: current,
            to: cap.max,
            rule: cap.describe(),
        });
    }

    let capped = GradeResult {
        dimension_scores: scores,
        point_losses,
        ..grade.clone()
    };
    (capped, adjustments)
}

/// 用维度分覆盖模型给出的总分
pub fn enforce_overall_score(grade: GradeResult) -> GradeResult {
    GradeResult {
        overall_score: grade.dimension_scores.overall(),
        ..grade
    }
}

fn new_variation_seed() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 两阶段评分流水线
///
/// - 不持有可变状态，可以在多个任务间共享（`Arc<GradingPipeline>`）
/// - 只依赖能力（StructuredGenerator / PresetSource），不关心具体模型
pub struct GradingPipeline {
    generator: Arc<dyn StructuredGenerator>,
    presets: Arc<dyn PresetSource>,
    rubric: Rubric,
    grade_schema: OutputSchema,
    coach_schema: OutputSchema,
    judge_temperature: f32,
    coach_temperature: f32,
    enforce_hard_caps: bool,
    default_market: String,
}

impl GradingPipeline {
    /// 使用标准细则创建流水线
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        presets: Arc<dyn PresetSource>,
        config: &Config,
    ) -> Self {
        Self {
            generator,
            presets,
            rubric: Rubric::standard(),
            grade_schema: grade_result_schema(),
            coach_schema: coach_patch_schema(),
            judge_temperature: config.judge_temperature,
            coach_temperature: config.coach_temperature,
            enforce_hard_caps: config.enforce_hard_caps,
            default_market: config.default_market.clone(),
        }
    }

    /// 按配置创建：配置了 `rubric_file` 时换成文件里的细则
    pub fn from_config(
        generator: Arc<dyn StructuredGenerator>,
        presets: Arc<dyn PresetSource>,
        config: &Config,
    ) -> AppResult<Self> {
        let pipeline = Self::new(generator, presets, config);
        match &config.rubric_file {
            Some(path) => {
                let rubric = Rubric::from_toml_file(Path::new(path))?;
                info!("📐 使用自定义评分细则: {}", path);
                pipeline.with_rubric(rubric)
            }
            None => Ok(pipeline),
        }
    }

    /// 替换评分细则
    pub fn with_rubric(mut self, rubric: Rubric) -> AppResult<Self> {
        rubric.validate()?;
        self.rubric = rubric;
        Ok(self)
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// 评一轮回答
    pub async fn grade(&self, request: &GradeRequest) -> AppResult<GradeResult> {
        request.validate()?;

        let market = request.market.as_deref().unwrap_or(&self.default_market);
        let preset = self.presets.lookup(market).await?;
        let seed = request.seed.clone().unwrap_or_else(new_variation_seed);

        debug!(
            "开始评分 (模型: {}, 市场: {}, seed: {}): {}",
            self.generator.model_name(),
            market,
            seed,
            truncate_text(&request.rep_response, 60)
        );

        // ========== 阶段 1: Judge ==========
        let judge = self.run_judge(request, &preset, &seed).await?;

        // ========== 阶段 2: Coach ==========
        let patch = self.run_coach(&judge, &seed).await?;

        // ========== 合并 + 最终校验 ==========
        let merged = merge_coach_patch(&judge, patch);
        self.validate_final(&merged)?;

        info!(
            "✓ 评分完成: {} 分, 主要问题: {}",
            merged.overall_score, merged.primary_failure.code
        );
        Ok(merged)
    }

    /// Judge 阶段：打分 → 硬上限 → 总分
    async fn run_judge(
        &self,
        request: &GradeRequest,
        preset: &PromptPreset,
        seed: &str,
    ) -> AppResult<GradeResult> {
        let prompt = judge_prompt(&self.rubric, preset, request, seed, self.judge_temperature)?;
        let raw = self.generator.generate(&prompt, &self.grade_schema).await?;
        let proposed: GradeResult = self.grade_schema.parse(GradingStage::Judge, raw)?;

        debug!(
            "Judge 完成: 模型总分 {}, 维度合计 {}",
            proposed.overall_score,
            proposed.dimension_scores.sum()
        );

        let capped = if self.enforce_hard_caps {
            let (capped, adjustments) = enforce_hard_caps(&self.rubric.hard_caps, &proposed);
            for adj in &adjustments {
                warn!(
                    "⚠️ 硬上限收紧 {}: {} → {} ({})",
                    adj.dimension, adj.from, adj.to, adj.rule
                );
            }
            capped
        } else {
            proposed
        };

        let judge = enforce_overall_score(capped);
        Ok(GradeResult {
            variation_seed: Some(seed.to_string()),
            ..judge
        })
    }

    /// Coach 阶段：只读 Judge 记录，只返回两个字段
    async fn run_coach(&self, judge: &GradeResult, seed: &str) -> AppResult<CoachPatch> {
        let prompt = coach_prompt(judge, seed, self.coach_temperature)?;
        let raw = self.generator.generate(&prompt, &self.coach_schema).await?;
        let patch: CoachPatch = self.coach_schema.parse(GradingStage::Coach, raw)?;
        debug!("Coach 完成: {}", truncate_text(&patch.one_action_fix.instruction, 60));
        Ok(patch)
    }

    fn validate_final(&self, merged: &GradeResult) -> AppResult<()> {
        let value = serde_json::to_value(merged)?;
        self.grade_schema.validate(GradingStage::Final, &value)?;

        if !merged.overall_is_consistent() {
            return Err(AppError::malformed(
                GradingStage::Final,
                format!(
                    "总分 {} 与维度分不一致 (应为 {})",
                    merged.overall_score,
                    merged.dimension_scores.overall()
                ),
                Some(value.to_string()),
            ));
        }
        Ok(())
    }
}
