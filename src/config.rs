use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// Judge 阶段采样温度（越低越稳定）
    pub judge_temperature: f32,
    /// Coach 阶段采样温度（越高措辞越多样）
    pub coach_temperature: f32,
    pub llm_max_tokens: u32,
    /// 是否在服务端强制执行硬上限
    pub enforce_hard_caps: bool,
    // --- 批处理配置 ---
    /// 练习文件（TOML）存放目录
    pub practice_folder: String,
    /// 尝试 / 会话存储文件
    pub data_file: String,
    /// 写入哪个团队
    pub team_id: String,
    /// 同时评分的会话数量
    pub max_concurrent_sessions: usize,
    /// 教练建议的滚动窗口
    pub coaching_window: usize,
    /// 默认市场
    pub default_market: String,
    /// 自定义评分细则（TOML），缺省使用内置细则
    pub rubric_file: Option<String>,
    // --- 提示词预设 API（可选） ---
    pub preset_api_base_url: Option<String>,
    pub preset_api_key: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4.1-mini".to_string(),
            judge_temperature: 0.1,
            coach_temperature: 0.7,
            llm_max_tokens: 2048,
            enforce_hard_caps: true,
            practice_folder: "practice_toml".to_string(),
            data_file: ".data/praxis.json".to_string(),
            team_id: "team_default".to_string(),
            max_concurrent_sessions: 4,
            coaching_window: 20,
            default_market: "d2d_pest".to_string(),
            rubric_file: None,
            preset_api_base_url: None,
            preset_api_key: None,
            verbose_logging: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// 先读 TOML 文件，再用环境变量覆盖
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.overlay_env())
    }

    fn overlay_env(self) -> Self {
        let base = self;
        Self {
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or(base.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL")
                .unwrap_or(base.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME")
                .or_else(|_| std::env::var("OPENAI_MODEL"))
                .unwrap_or(base.llm_model_name),
            judge_temperature: env_or("JUDGE_TEMPERATURE", base.judge_temperature),
            coach_temperature: env_or("COACH_TEMPERATURE", base.coach_temperature),
            llm_max_tokens: env_or("LLM_MAX_TOKENS", base.llm_max_tokens),
            enforce_hard_caps: env_or("ENFORCE_HARD_CAPS", base.enforce_hard_caps),
            practice_folder: std::env::var("PRACTICE_FOLDER")
                .unwrap_or(base.practice_folder),
            data_file: std::env::var("DATA_FILE").unwrap_or(base.data_file),
            team_id: std::env::var("TEAM_ID").unwrap_or(base.team_id),
            max_concurrent_sessions: env_or(
                "MAX_CONCURRENT_SESSIONS",
                base.max_concurrent_sessions,
            ),
            coaching_window: env_or("COACHING_WINDOW", base.coaching_window),
            default_market: std::env::var("DEFAULT_MARKET").unwrap_or(base.default_market),
            rubric_file: std::env::var("RUBRIC_FILE").ok().or(base.rubric_file),
            preset_api_base_url: std::env::var("PRESET_API_BASE_URL")
                .ok()
                .or(base.preset_api_base_url),
            preset_api_key: std::env::var("PRESET_API_KEY").ok().or(base.preset_api_key),
            verbose_logging: env_or("VERBOSE_LOGGING", base.verbose_logging),
        }
    }

    /// 检查 LLM 凭据，缺失时返回配置错误
    pub fn validate_llm(&self) -> AppResult<()> {
        if self.llm_api_key.trim().is_empty() {
            return Err(AppError::configuration("缺少 LLM_API_KEY（或 OPENAI_API_KEY）"));
        }
        if self.llm_model_name.trim().is_empty() {
            return Err(AppError::configuration("缺少 LLM_MODEL_NAME"));
        }
        Ok(())
    }
}
