//! 评分细则（Rubric）
//!
//! 固定 6 个维度、每个维度 5/3/1/0 四档锚点、团队规则（house rules）、
//! 7 项行为检查的定义和硬上限规则。
//!
//! 这是配置数据而不是代码：换一份 `Rubric`，评分行为随之改变，流水线本身不变。

use std::fmt;
use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// 评分维度（封闭集合，不允许动态扩展）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Clarity,
    ObjectionIsolation,
    HomeownerAlignment,
    Tone,
    CloseAttempt,
    RapportBuilding,
}

static DIMENSION_KEYS: phf::Map<&'static str, Dimension> = phf::phf_map! {
    "clarity" => Dimension::Clarity,
    "objection_isolation" => Dimension::ObjectionIsolation,
    "homeowner_alignment" => Dimension::HomeownerAlignment,
    "tone" => Dimension::Tone,
    "close_attempt" => Dimension::CloseAttempt,
    "rapport_building" => Dimension::RapportBuilding,
};

impl Dimension {
    /// 规范顺序
    pub const ALL: [Dimension; 6] = [
        Dimension::Clarity,
        Dimension::ObjectionIsolation,
        Dimension::HomeownerAlignment,
        Dimension::Tone,
        Dimension::CloseAttempt,
        Dimension::RapportBuilding,
    ];

    /// 单维度满分
    pub const MAX_SCORE: u8 = 5;

    pub fn key(self) -> &'static str {
        match self {
            Dimension::Clarity => "clarity",
            Dimension::ObjectionIsolation => "objection_isolation",
            Dimension::HomeownerAlignment => "homeowner_alignment",
            Dimension::Tone => "tone",
            Dimension::CloseAttempt => "close_attempt",
            Dimension::RapportBuilding => "rapport_building",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        DIMENSION_KEYS.get(key).copied()
    }
}

/// 模型输出和细则文件里的维度 key 都经过 `from_key` 解析
impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Dimension::from_key(&key).ok_or_else(|| de::Error::custom(format!("未知维度: {}", key)))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 行为检查项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCheck {
    AcknowledgedObjection,
    AskedClarifyingQuestion,
    NamedSpecificPestOrRisk,
    ExplainedValueInHomeownerTerms,
    BuiltTrustProcessOrCredibility,
    AttemptedCloseNextStep,
    KeptUnder20Seconds,
}

impl BehaviorCheck {
    pub const ALL: [BehaviorCheck; 7] = [
        BehaviorCheck::AcknowledgedObjection,
        BehaviorCheck::AskedClarifyingQuestion,
        BehaviorCheck::NamedSpecificPestOrRisk,
        BehaviorCheck::ExplainedValueInHomeownerTerms,
        BehaviorCheck::BuiltTrustProcessOrCredibility,
        BehaviorCheck::AttemptedCloseNextStep,
        BehaviorCheck::KeptUnder20Seconds,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BehaviorCheck::AcknowledgedObjection => "acknowledged_objection",
            BehaviorCheck::AskedClarifyingQuestion => "asked_clarifying_question",
            BehaviorCheck::NamedSpecificPestOrRisk => "named_specific_pest_or_risk",
            BehaviorCheck::ExplainedValueInHomeownerTerms => "explained_value_in_homeowner_terms",
            BehaviorCheck::BuiltTrustProcessOrCredibility => "built_trust_process_or_credibility",
            BehaviorCheck::AttemptedCloseNextStep => "attempted_close_next_step",
            BehaviorCheck::KeptUnder20Seconds => "kept_under_20_seconds",
        }
    }

    /// 提示词里给模型看的定义
    pub fn definition(self) -> &'static str {
        match self {
            BehaviorCheck::AcknowledgedObjection => {
                "explicitly validates or acknowledges the objection."
            }
            BehaviorCheck::AskedClarifyingQuestion => {
                "asks ONE question to isolate the real reason before explaining."
            }
            BehaviorCheck::NamedSpecificPestOrRisk => {
                "mentions a pest, seasonality, entry point, or prevention outcome."
            }
            BehaviorCheck::ExplainedValueInHomeownerTerms => {
                "value stated in plain homeowner terms (not features)."
            }
            BehaviorCheck::BuiltTrustProcessOrCredibility => {
                "mentions what happens next / process / guarantee / proof."
            }
            BehaviorCheck::AttemptedCloseNextStep => {
                "asks for commitment (start/schedule) with a clear next step."
            }
            BehaviorCheck::KeptUnder20Seconds => {
                "would take ~20 seconds or less to say out loud."
            }
        }
    }
}

/// 硬上限的触发条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "check")]
pub enum CapTrigger {
    /// 某项行为检查为 false
    Missing(BehaviorCheck),
    /// 回答啰嗦（无对应字段，只能由模型判断）
    Rambling,
}

/// 硬上限规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardCap {
    pub dimension: Dimension,
    pub max: u8,
    pub trigger: CapTrigger,
}

impl HardCap {
    /// 渲染成提示词里的一行
    pub fn describe(&self) -> String {
        match self.trigger {
            CapTrigger::Missing(check) => format!(
                "If {} = false => {} <= {}",
                check.key(),
                self.dimension,
                self.max
            ),
            CapTrigger::Rambling => {
                format!("If response is rambling => {} <= {}", self.dimension, self.max)
            }
        }
    }
}

/// 单个维度的说明和锚点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub key: Dimension,
    pub name: String,
    pub what_good_looks_like: String,
    /// 5 / 3 / 1 / 0 四档
    pub anchors: Anchors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchors {
    #[serde(rename = "5")]
    pub five: String,
    #[serde(rename = "3")]
    pub three: String,
    #[serde(rename = "1")]
    pub one: String,
    #[serde(rename = "0")]
    pub zero: String,
}

/// 团队规则：产品自己的标准，不是普适真理
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseRules {
    pub start_style: String,
    pub isolate_with_one_question: bool,
    pub include_specific_pest_or_property_reference: bool,
    pub close_required: bool,
    pub ethical_only: bool,
}

/// 完整评分细则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub dimensions: Vec<DimensionSpec>,
    pub rules: HouseRules,
    pub hard_caps: Vec<HardCap>,
}

fn spec(key: Dimension, name: &str, good: &str, anchors: [&str; 4]) -> DimensionSpec {
    let [five, three, one, zero] = anchors;
    DimensionSpec {
        key,
        name: name.to_string(),
        what_good_looks_like: good.to_string(),
        anchors: Anchors {
            five: five.to_string(),
            three: three.to_string(),
            one: one.to_string(),
            zero: zero.to_string(),
        },
    }
}

impl Rubric {
    /// 上门除虫销售的标准细则
    pub fn standard() -> Self {
        let dimensions = vec![
            spec(
                Dimension::Clarity,
                "Clarity",
                "Direct, concise, easy to understand. No rambling. Uses simple homeowner language.",
                [
                    "Short, specific, no filler, homeowner language, easy to repeat.",
                    "Mostly clear but wordy or slightly confusing in spots.",
                    "Hard to follow, rambling, vague, or full of filler.",
                    "Incoherent / not an answer.",
                ],
            ),
            spec(
                Dimension::ObjectionIsolation,
                "Objection isolation",
                "Quickly identifies the real objection (timing/price/already-have/value). Asks a tight clarifying question.",
                [
                    "Quickly surfaces the real barrier with ONE tight question.",
                    "Asks a question but it's too broad or takes too long to get there.",
                    "Doesn't isolate; talks past the objection.",
                    "Ignores the objection entirely.",
                ],
            ),
            spec(
                Dimension::HomeownerAlignment,
                "Alignment with homeowner",
                "Acknowledges their concern, references their situation, avoids pushy/argumentative framing.",
                [
                    "Validates + connects to homeowner's situation; respectful framing.",
                    "Some empathy but generic / not tailored.",
                    "Pushy, argumentative, or dismissive.",
                    "Disrespectful / manipulative.",
                ],
            ),
            spec(
                Dimension::Tone,
                "Tone",
                "Confident, respectful, calm. No guilt trips. Sounds human, not a script robot.",
                [
                    "Calm, confident, friendly, professional.",
                    "Mostly fine but slightly needy, defensive, or robotic.",
                    "Anxious, aggressive, or guilt-trippy.",
                    "Hostile / inappropriate.",
                ],
            ),
            spec(
                Dimension::CloseAttempt,
                "Close attempt",
                "Ends with a clear next step (start service / schedule first treatment) with a specific ask.",
                [
                    "Clear next step with a specific close (schedule/start) and a simple choice.",
                    "Close exists but weak/vague (e.g., \"so... what do you think?\").",
                    "No close or ends with information only.",
                    "Actively avoids asking for action.",
                ],
            ),
            spec(
                Dimension::RapportBuilding,
                "Rapport building",
                "Small human element (quick empathy, simple question, personalization) without wasting time.",
                [
                    "Quick personal touch (question or observation) that builds trust fast.",
                    "Some rapport attempt but generic.",
                    "No rapport; purely transactional or awkward.",
                    "Damages rapport.",
                ],
            ),
        ];

        let hard_caps = vec![
            HardCap {
                trigger: CapTrigger::Missing(BehaviorCheck::AskedClarifyingQuestion),
                dimension: Dimension::ObjectionIsolation,
                max: 2,
            },
            HardCap {
                trigger: CapTrigger::Missing(BehaviorCheck::AttemptedCloseNextStep),
                dimension: Dimension::CloseAttempt,
                max: 2,
            },
            HardCap {
                trigger: CapTrigger::Missing(BehaviorCheck::NamedSpecificPestOrRisk),
                dimension: Dimension::HomeownerAlignment,
                max: 3,
            },
            HardCap {
                trigger: CapTrigger::Missing(BehaviorCheck::BuiltTrustProcessOrCredibility),
                dimension: Dimension::RapportBuilding,
                max: 3,
            },
            HardCap {
                trigger: CapTrigger::Rambling,
                dimension: Dimension::Clarity,
                max: 3,
            },
        ];

        Self {
            dimensions,
            rules: HouseRules {
                start_style: "Acknowledge quickly (e.g., 'Totally fair.') but do NOT force exact wording."
                    .to_string(),
                isolate_with_one_question: true,
                include_specific_pest_or_property_reference: true,
                close_required: true,
                ethical_only: true,
            },
            hard_caps,
        }
    }

    /// 从 TOML 文件读取自定义细则，读完即校验
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("无法读取评分细则 {}: {}", path.display(), e))
        })?;
        let rubric: Rubric = toml::from_str(&content).map_err(|e| {
            AppError::configuration(format!("评分细则格式错误 {}: {}", path.display(), e))
        })?;
        rubric.validate()?;
        Ok(rubric)
    }

    /// 自定义细则必须恰好覆盖 6 个维度
    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions.len() != Dimension::ALL.len() {
            return Err(AppError::configuration(format!(
                "评分细则必须包含 {} 个维度，实际 {}",
                Dimension::ALL.len(),
                self.dimensions.len()
            )));
        }
        for dim in Dimension::ALL {
            if !self.dimensions.iter().any(|d| d.key == dim) {
                return Err(AppError::configuration(format!("评分细则缺少维度: {}", dim)));
            }
        }
        if let Some(cap) = self.hard_caps.iter().find(|c| c.max > Dimension::MAX_SCORE) {
            return Err(AppError::configuration(format!(
                "硬上限超出范围: {} <= {}",
                cap.dimension, cap.max
            )));
        }
        Ok(())
    }

    /// 按规范顺序排列的维度 key
    pub fn dimension_keys(&self) -> Vec<&'static str> {
        Dimension::ALL.iter().map(|d| d.key()).collect()
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::standard()
    }
}
