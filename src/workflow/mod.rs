pub mod grading_flow;
pub mod prompts;

pub use grading_flow::{enforce_hard_caps, enforce_overall_score, CapAdjustment, GradingPipeline};
pub use prompts::{coach_prompt, judge_prompt};
