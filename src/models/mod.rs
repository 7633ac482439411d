pub mod attempt;
pub mod grade;
pub mod loaders;
pub mod practice;
pub mod rubric;

pub use attempt::{top_tags, Attempt, AttemptMeta, Session, TagCount, ROUNDS};
pub use grade::{
    merge_coach_patch, BehaviorChecks, CoachPatch, DimensionScores, FailureCode, GradeRequest,
    GradeResult, OneActionFix, PointLoss, PrimaryFailure, Rewrite,
};
pub use loaders::{load_all_practice_files, load_practice_session};
pub use practice::{PracticeRound, PracticeSession};
pub use rubric::{BehaviorCheck, CapTrigger, Dimension, HardCap, HouseRules, Rubric};
