//! 输出 schema 与校验
//!
//! 同一份 JSON Schema 有两种用途：
//! - 去掉数值 / 长度约束后作为 `response_format` 发给模型（strict 模式只支持子集）
//! - 完整版本在本地用 `jsonschema` 校验模型返回值

use std::sync::Arc;

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use crate::error::{AppError, AppResult, GradingStage};
use crate::models::grade::FailureCode;
use crate::models::rubric::{BehaviorCheck, Dimension};
use crate::utils::logging::truncate_text;

/// strict 模式不接受的约束关键字
const CONSTRAINT_KEYWORDS: [&str; 6] = [
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
];

/// 带名字的输出 schema
///
/// 构建时编译一次；编译失败的 schema 在每次校验时报配置错误
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    schema: JsonValue,
    compiled: Result<Arc<JSONSchema>, String>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: JsonValue) -> Self {
        let compiled = JSONSchema::compile(&schema)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        Self {
            name: name.into(),
            schema,
            compiled,
        }
    }

    pub fn schema(&self) -> &JsonValue {
        &self.schema
    }

    /// 发给模型的版本
    pub fn wire_schema(&self) -> JsonValue {
        strip_constraints(&self.schema)
    }

    /// 校验模型返回值
    pub fn validate(&self, stage: GradingStage, value: &JsonValue) -> AppResult<()> {
        let compiled = self.compiled.as_ref().map_err(|e| {
            AppError::configuration(format!("schema {} 无法编译: {}", self.name, e))
        })?;

        if let Err(errors) = compiled.validate(value) {
            let messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path_display = if path.is_empty() {
                        "root".to_string()
                    } else {
                        path
                    };
                    format!("{}: {}", path_display, e)
                })
                .collect();

            warn!(
                stage = %stage,
                schema = %self.name,
                "模型输出未通过 schema 校验: {}",
                messages.join("; ")
            );

            return Err(AppError::malformed(
                stage,
                format!("schema {} 校验失败: {}", self.name, messages.join("; ")),
                Some(value.to_string()),
            ));
        }
        Ok(())
    }

    /// 先做 schema 校验，再反序列化
    pub fn parse<T: DeserializeOwned>(
        &self,
        stage: GradingStage,
        value: JsonValue,
    ) -> AppResult<T> {
        self.validate(stage, &value)?;
        let raw = value.to_string();
        serde_json::from_value(value).map_err(|e| {
            warn!(stage = %stage, "模型输出无法反序列化: {}", truncate_text(&raw, 200));
            AppError::malformed(stage, format!("无法反序列化: {}", e), Some(raw))
        })
    }
}

fn strip_constraints(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(k, _)| !CONSTRAINT_KEYWORDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), strip_constraints(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(strip_constraints).collect()),
        other => other.clone(),
    }
}

fn strict_object(properties: JsonValue) -> JsonValue {
    let required: Vec<JsonValue> = properties
        .as_object()
        .map(|m| m.keys().map(|k| json!(k)).collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

fn text(min_len: usize) -> JsonValue {
    json!({ "type": "string", "minLength": min_len })
}

fn one_action_fix_schema() -> JsonValue {
    strict_object(json!({
        "instruction": text(8),
        "example_line": text(3),
    }))
}

fn rewrite_schema() -> JsonValue {
    strict_object(json!({ "rep_response_v1": text(3) }))
}

/// 完整 GradeResult 的 schema（Judge 输出和最终结果都用它）
pub fn grade_result_schema() -> OutputSchema {
    let score = json!({ "type": "integer", "minimum": 0, "maximum": Dimension::MAX_SCORE });

    let mut dims = serde_json::Map::new();
    for dim in Dimension::ALL {
        dims.insert(dim.key().to_string(), score.clone());
    }

    let mut checks = serde_json::Map::new();
    for check in BehaviorCheck::ALL {
        checks.insert(check.key().to_string(), json!({ "type": "boolean" }));
    }

    let dimension_keys: Vec<&str> = Dimension::ALL.iter().map(|d| d.key()).collect();
    let failure_codes: Vec<&str> = FailureCode::ALL.iter().map(|c| c.as_str()).collect();

    let schema = strict_object(json!({
        "overall_score": { "type": "integer", "minimum": 0, "maximum": 100 },
        "dimension_scores": strict_object(JsonValue::Object(dims)),
        "behavior_checks": strict_object(JsonValue::Object(checks)),
        "primary_failure": strict_object(json!({
            "code": { "type": "string", "enum": failure_codes },
            "why_it_matters": text(10),
            "what_to_do_instead": text(10),
        })),
        "point_losses": {
            "type": "array",
            "items": strict_object(json!({
                "dimension": { "type": "string", "enum": dimension_keys },
                "lost": { "type": "integer", "minimum": 1, "maximum": Dimension::MAX_SCORE },
                "reason": text(5),
            })),
        },
        "one_action_fix": one_action_fix_schema(),
        "rewrite": rewrite_schema(),
        "variation_seed": { "type": ["string", "null"] },
    }));

    OutputSchema::new("grade_core", schema)
}

/// Coach 阶段只输出两个字段
pub fn coach_patch_schema() -> OutputSchema {
    OutputSchema::new(
        "grade_coach",
        strict_object(json!({
            "one_action_fix": one_action_fix_schema(),
            "rewrite": rewrite_schema(),
        })),
    )
}
