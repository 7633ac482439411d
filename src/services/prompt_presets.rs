//! 市场提示词预设
//!
//! 每个市场（market slug）有一组 `{instructions, rules}` 文本，原样注入 Judge 提示词。
//! 来源可以是内置表，也可以是 PostgREST 风格的 `prompt_presets` 表。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 默认市场
pub const DEFAULT_MARKET: &str = "d2d_pest";

/// 一个市场的提示词预设
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPreset {
    pub instructions: String,
    pub rules: String,
}

/// 预设查询能力
#[async_trait]
pub trait PresetSource: Send + Sync {
    /// 未知市场返回配置错误
    async fn lookup(&self, market: &str) -> AppResult<PromptPreset>;
}

/// 内置预设表
#[derive(Debug, Clone, Default)]
pub struct StaticPresets {
    presets: HashMap<String, PromptPreset>,
}

impl StaticPresets {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只包含 d2d_pest 的默认表
    pub fn with_defaults() -> Self {
        Self::new().with_preset(
            DEFAULT_MARKET,
            PromptPreset {
                instructions: "Grade door-to-door pest control reps talking to homeowners \
                               on the porch. Be direct and specific; reward behavior, \
                               not confidence."
                    .to_string(),
                rules: "- Ethical selling only: no fear tactics, no fake urgency.\n\
                        - Reference a concrete pest, season, or entry point when possible.\n\
                        - Always end with a clear next step \
                        (inspection, schedule, same-day service)."
                    .to_string(),
            },
        )
    }

    pub fn with_preset(mut self, market: impl Into<String>, preset: PromptPreset) -> Self {
        self.presets.insert(market.into(), preset);
        self
    }
}

#[async_trait]
impl PresetSource for StaticPresets {
    async fn lookup(&self, market: &str) -> AppResult<PromptPreset> {
        self.presets
            .get(market)
            .cloned()
            .ok_or_else(|| AppError::configuration(format!("缺少市场预设: {}", market)))
    }
}

/// 从 PostgREST 接口读取预设
///
/// `GET {base}/rest/v1/prompt_presets?market_slug=eq.{slug}&select=instructions,rules`
pub struct HttpPresets {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPresets {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/prompt_presets", self.base_url)
    }
}

#[async_trait]
impl PresetSource for HttpPresets {
    async fn lookup(&self, market: &str) -> AppResult<PromptPreset> {
        debug!("查询市场预设: {}", market);

        let mut request = self.client.get(self.endpoint()).query(&[
            ("market_slug", format!("eq.{}", market)),
            ("select", "instructions,rules".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::transient("prompt_presets", e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::transient("prompt_presets", format!("预设服务返回 {}", status)));
        }
        if !status.is_success() {
            return Err(AppError::configuration(format!(
                "预设服务拒绝请求 ({}): {}",
                status, market
            )));
        }

        let rows: Vec<PromptPreset> = response
            .json()
            .await
            .map_err(|e| AppError::configuration(format!("预设格式不正确: {}", e)))?;

        rows.into_iter().next().ok_or_else(|| {
            warn!("市场 {} 没有预设", market);
            AppError::configuration(format!("缺少市场预设: {}", market))
        })
    }
}

/// 根据配置选择预设来源
pub fn preset_source_from_config(config: &Config) -> Box<dyn PresetSource> {
    match &config.preset_api_base_url {
        Some(base) if !base.trim().is_empty() => {
            Box::new(HttpPresets::new(base.clone(), config.preset_api_key.clone()))
        }
        _ => Box::new(StaticPresets::with_defaults()),
    }
}
