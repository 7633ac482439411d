//! Judge / Coach 两个阶段的提示词
//!
//! 提示词正文保持英文（模型和销售都用英文），结构固定：
//! 上下文 → 异议 → 回答 → 细则 → 行为检查定义 → 硬上限 → 计分约束 → 变体种子

use crate::error::{AppResult, GradingStage};
use crate::models::grade::{GradeRequest, GradeResult};
use crate::models::rubric::{BehaviorCheck, Rubric};
use crate::services::llm_service::PromptSpec;
use crate::services::prompt_presets::PromptPreset;

const JUDGE_SYSTEM: &str = "\
You are a strict evaluator for door-to-door pest control objection handling.
Your job is to diagnose behavior, not vibes.
Output must match the JSON schema exactly (Structured Output). No markdown.

Rules:
- First fill behavior_checks true/false based ONLY on the rep response.
- Then score the 6 dimensions 0-5 using anchors AND the caps below.
- Then choose exactly one primary_failure (most responsible for losing the deal).
- Then write point_losses ONLY where lost > 0.
- Then write one_action_fix (single behavior) + example_line.
- Then write rewrite.rep_response_v1 (porch speak, realistic, under 1200 chars).";

const COACH_SYSTEM: &str = "\
You are a sales coach refining output presentation.
You MUST keep the scores exactly the same.
You MUST NOT contradict point_losses or primary_failure.
Make one_action_fix and rewrite feel fresh (not templated).
Output must match the schema exactly (Structured Output). No markdown.";

/// Judge 阶段提示词，市场预设原样注入
pub fn judge_prompt(
    rubric: &Rubric,
    preset: &PromptPreset,
    request: &GradeRequest,
    seed: &str,
    temperature: f32,
) -> AppResult<PromptSpec> {
    let system = format!(
        "{}\n\nMARKET INSTRUCTIONS:\n{}",
        JUDGE_SYSTEM, preset.instructions
    );

    let checks = BehaviorCheck::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.key(), c.definition()))
        .collect::<Vec<_>>()
        .join("\n");

    let caps = rubric
        .hard_caps
        .iter()
        .map(|c| format!("- {}", c.describe()))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "CONTEXT:\n{context}\n\n\
         OBJECTION:\n{objection}\n\n\
         REP RESPONSE:\n{response}\n\n\
         DIMENSIONS:\n{dims}\n\n\
         ANCHORS:\n{anchors}\n\n\
         HOUSE RULES:\n{rules}\n\n\
         MARKET RULES:\n{market_rules}\n\n\
         BEHAVIOR CHECK DEFINITIONS:\n{checks}\n\n\
         HARD CAPS (apply these):\n{caps}\n\n\
         SCORING CONSTRAINT:\n\
         overall_score MUST equal round((sum(dimension_scores)/30)*100).\n\n\
         VARIATION SEED (use for wording only, NOT scores): {seed}",
        context = request.context.trim(),
        objection = request.objection.trim(),
        response = request.rep_response.trim(),
        dims = rubric.dimension_keys().join(", "),
        anchors = serde_json::to_string_pretty(&rubric.dimensions)?,
        rules = serde_json::to_string_pretty(&rubric.rules)?,
        market_rules = preset.rules,
        checks = checks,
        caps = caps,
        seed = seed,
    );

    Ok(PromptSpec {
        stage: GradingStage::Judge,
        system,
        user,
        temperature,
    })
}

/// Coach 阶段提示词：只读的 Judge 记录 + 改写要求
pub fn coach_prompt(judge: &GradeResult, seed: &str, temperature: f32) -> AppResult<PromptSpec> {
    let user = format!(
        "JUDGE OUTPUT:\n{judge}\n\n\
         Generate:\n\
         - one_action_fix.instruction: ONE specific behavior the rep should do next time\n\
         - one_action_fix.example_line: ONE line they can literally say\n\
         - rewrite.rep_response_v1: a high-quality rewrite that fits the objection + context\n\n\
         Constraints:\n\
         - Speakable on a porch.\n\
         - Under 1200 characters.\n\
         - Use a different sentence structure than the judge rewrite.\n\
         - Use variation_seed for phrasing variety: {seed}",
        judge = serde_json::to_string_pretty(judge)?,
        seed = seed,
    );

    Ok(PromptSpec {
        stage: GradingStage::Coach,
        system: COACH_SYSTEM.to_string(),
        user,
        temperature,
    })
}
