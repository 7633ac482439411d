pub mod coaching;
pub mod llm_service;
pub mod metrics;
pub mod prompt_presets;
pub mod schema;

pub use coaching::{build_coaching_plans, CoachingPlan, Drill, Impact, Phase, DRILLS};
pub use llm_service::{LlmService, PromptSpec, StructuredGenerator};
pub use metrics::{
    build_insights, build_rep_coaching, build_rep_rows, build_summary, build_trend,
    InsightAction, ManagerInsights, RepCoachingRow, RepRow, ScoreBuckets, Summary, TrendPoint,
};
pub use prompt_presets::{
    preset_source_from_config, HttpPresets, PresetSource, PromptPreset, StaticPresets,
    DEFAULT_MARKET,
};
pub use schema::{coach_patch_schema, grade_result_schema, OutputSchema};
