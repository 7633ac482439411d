//! 评分结果（GradeResult）及其组成部分

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::rubric::{BehaviorCheck, Dimension};

/// 6 个维度的分数，每项 0-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub clarity: u8,
    pub objection_isolation: u8,
    pub homeowner_alignment: u8,
    pub tone: u8,
    pub close_attempt: u8,
    pub rapport_building: u8,
}

impl DimensionScores {
    pub fn get(&self, dim: Dimension) -> u8 {
        match dim {
            Dimension::Clarity => self.clarity,
            Dimension::ObjectionIsolation => self.objection_isolation,
            Dimension::HomeownerAlignment => self.homeowner_alignment,
            Dimension::Tone => self.tone,
            Dimension::CloseAttempt => self.close_attempt,
            Dimension::RapportBuilding => self.rapport_building,
        }
    }

    /// 返回修改后的副本
    pub fn with(mut self, dim: Dimension, score: u8) -> Self {
        let slot = match dim {
            Dimension::Clarity => &mut self.clarity,
            Dimension::ObjectionIsolation => &mut self.objection_isolation,
            Dimension::HomeownerAlignment => &mut self.homeowner_alignment,
            Dimension::Tone => &mut self.tone,
            Dimension::CloseAttempt => &mut self.close_attempt,
            Dimension::RapportBuilding => &mut self.rapport_building,
        };
        *slot = score;
        self
    }

    /// 0..=30
    pub fn sum(&self) -> u32 {
        Dimension::ALL.iter().map(|d| u32::from(self.get(*d))).sum()
    }

    /// 唯一权威的总分规则：round(sum / 30 * 100)
    pub fn overall(&self) -> u8 {
        let max = (Dimension::ALL.len() as u32 * u32::from(Dimension::MAX_SCORE)) as f64;
        ((self.sum() as f64 / max) * 100.0).round() as u8
    }
}

/// 7 项行为检查
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorChecks {
    pub acknowledged_objection: bool,
    pub asked_clarifying_question: bool,
    pub named_specific_pest_or_risk: bool,
    pub explained_value_in_homeowner_terms: bool,
    pub built_trust_process_or_credibility: bool,
    pub attempted_close_next_step: bool,
    pub kept_under_20_seconds: bool,
}

impl BehaviorChecks {
    pub fn get(&self, check: BehaviorCheck) -> bool {
        match check {
            BehaviorCheck::AcknowledgedObjection => self.acknowledged_objection,
            BehaviorCheck::AskedClarifyingQuestion => self.asked_clarifying_question,
            BehaviorCheck::NamedSpecificPestOrRisk => self.named_specific_pest_or_risk,
            BehaviorCheck::ExplainedValueInHomeownerTerms => {
                self.explained_value_in_homeowner_terms
            }
            BehaviorCheck::BuiltTrustProcessOrCredibility => {
                self.built_trust_process_or_credibility
            }
            BehaviorCheck::AttemptedCloseNextStep => self.attempted_close_next_step,
            BehaviorCheck::KeptUnder20Seconds => self.kept_under_20_seconds,
        }
    }
}

/// 主要失败原因（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    NoIsolation,
    NoClose,
    TooGeneric,
    TooWordy,
    LowTrust,
    WeakTone,
}

impl FailureCode {
    pub const ALL: [FailureCode; 6] = [
        FailureCode::NoIsolation,
        FailureCode::NoClose,
        FailureCode::TooGeneric,
        FailureCode::TooWordy,
        FailureCode::LowTrust,
        FailureCode::WeakTone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::NoIsolation => "no_isolation",
            FailureCode::NoClose => "no_close",
            FailureCode::TooGeneric => "too_generic",
            FailureCode::TooWordy => "too_wordy",
            FailureCode::LowTrust => "low_trust",
            FailureCode::WeakTone => "weak_tone",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryFailure {
    pub code: FailureCode,
    pub why_it_matters: String,
    pub what_to_do_instead: String,
}

/// 只记录真正丢分的维度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointLoss {
    pub dimension: Dimension,
    pub lost: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneActionFix {
    pub instruction: String,
    pub example_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub rep_response_v1: String,
}

/// 评分流水线的最终输出，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub overall_score: u8,
    pub dimension_scores: DimensionScores,
    pub behavior_checks: BehaviorChecks,
    pub primary_failure: PrimaryFailure,
    #[serde(default)]
    pub point_losses: Vec<PointLoss>,
    pub one_action_fix: OneActionFix,
    pub rewrite: Rewrite,
    /// 只影响措辞，不影响分数
    pub variation_seed: Option<String>,
}

impl GradeResult {
    /// 失败标签（写入 Attempt）
    pub fn fail_tags(&self) -> Vec<String> {
        vec![self.primary_failure.code.as_str().to_string()]
    }

    /// 总分是否与维度分一致
    pub fn overall_is_consistent(&self) -> bool {
        self.overall_score == self.dimension_scores.overall()
    }
}

/// Coach 阶段只允许改写的两个字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachPatch {
    pub one_action_fix: OneActionFix,
    pub rewrite: Rewrite,
}

/// 纯函数：Judge 记录 + Coach 补丁 → 新记录，不修改输入
pub fn merge_coach_patch(judge: &GradeResult, patch: CoachPatch) -> GradeResult {
    GradeResult {
        one_action_fix: patch.one_action_fix,
        rewrite: patch.rewrite,
        ..judge.clone()
    }
}

/// 评分请求（JSON 字段为 camelCase：`repResponse`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub objection: String,
    pub context: String,
    pub rep_response: String,
    #[serde(default)]
    pub seed: Option<String>,
    /// 提示词预设的市场，缺省时使用配置里的默认市场
    #[serde(default)]
    pub market: Option<String>,
}

impl GradeRequest {
    pub fn new(
        objection: impl Into<String>,
        context: impl Into<String>,
        rep_response: impl Into<String>,
    ) -> Self {
        Self {
            objection: objection.into(),
            context: context.into(),
            rep_response: rep_response.into(),
            seed: None,
            market: None,
        }
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    /// 在调用 LLM 之前校验输入
    pub fn validate(&self) -> AppResult<()> {
        if self.objection.trim().is_empty() {
            return Err(AppError::validation("objection 不能为空"));
        }
        if self.context.trim().chars().count() < 5 {
            return Err(AppError::validation("context 至少需要 5 个字符"));
        }
        if self.rep_response.trim().chars().count() < 3 {
            return Err(AppError::validation("repResponse 至少需要 3 个字符"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: [u8; 6]) -> DimensionScores {
        DimensionScores {
            clarity: values[0],
            objection_isolation: values[1],
            homeowner_alignment: values[2],
            tone: values[3],
            close_attempt: values[4],
            rapport_building: values[5],
        }
    }

    #[test]
    fn test_overall_matches_rounding_rule() {
        assert_eq!(scores([0; 6]).overall(), 0);
        assert_eq!(scores([5; 6]).overall(), 100);
        // 17/30 = 56.67
        assert_eq!(scores([3, 2, 3, 4, 2, 3]).overall(), 57);
        // 1/30 = 3.33
        assert_eq!(scores([1, 0, 0, 0, 0, 0]).overall(), 3);
    }

    #[test]
    fn test_overall_exhaustive_against_formula() {
        for total in 0..=30u32 {
            let mut remaining = total;
            let mut values = [0u8; 6];
            for v in values.iter_mut() {
                let take = remaining.min(5);
                *v = take as u8;
                remaining -= take;
            }
            let expected = ((total as f64 / 30.0) * 100.0).round() as u8;
            assert_eq!(scores(values).overall(), expected, "sum = {}", total);
        }
    }

    #[test]
    fn test_with_replaces_single_dimension() {
        let s = scores([4; 6]).with(Dimension::CloseAttempt, 1);
        assert_eq!(s.close_attempt, 1);
        assert_eq!(s.clarity, 4);
        assert_eq!(s.sum(), 21);
    }

    #[test]
    fn test_request_validation() {
        assert!(GradeRequest::new("Too expensive", "Porch, summer", "Totally fair.")
            .validate()
            .is_ok());
        assert!(matches!(
            GradeRequest::new("  ", "Porch, summer", "Totally fair.").validate(),
            Err(AppError::Validation { .. })
        ));
        assert!(GradeRequest::new("Too expensive", "abc", "Totally fair.")
            .validate()
            .is_err());
        assert!(GradeRequest::new("Too expensive", "Porch, summer", "ok")
            .validate()
            .is_err());
    }

    #[test]
    fn test_request_parses_camel_case_json() {
        let request: GradeRequest = serde_json::from_value(serde_json::json!({
            "objection": "We already have a guy.",
            "context": "Ranch house, August.",
            "repResponse": "Totally fair. Who do you use?",
            "seed": "s1"
        }))
        .unwrap();
        assert_eq!(request.rep_response, "Totally fair. Who do you use?");
        assert_eq!(request.seed.as_deref(), Some("s1"));
        assert!(request.market.is_none());
        assert!(request.validate().is_ok());

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("repResponse").is_some());
        assert!(value.get("rep_response").is_none());
    }

    #[test]
    fn test_failure_code_serializes_snake_case() {
        let value = serde_json::to_value(FailureCode::NoClose).unwrap();
        assert_eq!(value, serde_json::json!("no_close"));
        let parsed: FailureCode = serde_json::from_value(serde_json::json!("weak_tone")).unwrap();
        assert_eq!(parsed, FailureCode::WeakTone);
    }
}
