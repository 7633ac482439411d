//! LLM 服务 - 业务能力层
//!
//! 只负责"按 schema 生成结构化输出"能力，不关心评分流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 使用 `response_format = json_schema` 强制结构化输出
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::sync::OnceLock;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, GradingStage};
use crate::services::schema::OutputSchema;
use crate::utils::logging::truncate_text;

/// 一次结构化生成的提示词
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub stage: GradingStage,
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// 结构化生成能力
///
/// 评分流水线只依赖这个 trait，不关心背后是哪家模型
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// 返回符合（或声称符合）schema 的 JSON，由调用方负责校验
    async fn generate(&self, prompt: &PromptSpec, schema: &OutputSchema) -> AppResult<JsonValue>;

    /// 用于日志
    fn model_name(&self) -> &str;
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 生成结构化 JSON
/// - 把提供方错误归类为配置错误 / 瞬时错误 / 输出不合法
/// - 单次调用，不做重试
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务，缺少凭据时返回配置错误
    pub fn new(config: &Config) -> AppResult<Self> {
        config.validate_llm()?;

        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Ok(Self {
            client,
            model_name: config.llm_model_name.clone(),
            max_tokens: config.llm_max_tokens,
        })
    }

    fn build_messages(&self, prompt: &PromptSpec) -> AppResult<Vec<ChatCompletionRequestMessage>> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(|e| classify_openai_error(&self.model_name, prompt.stage, e))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()
            .map_err(|e| classify_openai_error(&self.model_name, prompt.stage, e))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }
}

#[async_trait]
impl StructuredGenerator for LlmService {
    async fn generate(&self, prompt: &PromptSpec, schema: &OutputSchema) -> AppResult<JsonValue> {
        debug!(
            "调用 LLM API，模型: {}，阶段: {}，温度: {}",
            self.model_name, prompt.stage, prompt.temperature
        );
        debug!("用户消息长度: {} 字符", prompt.user.len());

        let messages = self.build_messages(prompt)?;

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(prompt.temperature)
            .max_completion_tokens(self.max_tokens)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema.name.clone(),
                    schema: Some(schema.wire_schema()),
                    strict: Some(true),
                },
            })
            .build()
            .map_err(|e| classify_openai_error(&self.model_name, prompt.stage, e))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败 ({}): {}", prompt.stage, e);
            classify_openai_error(&self.model_name, prompt.stage, e)
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::malformed(prompt.stage, "LLM 返回内容为空", None))?;

        parse_json_content(prompt.stage, &content)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("fence regex is valid")
    })
}

/// 解析模型返回的 JSON 文本
///
/// 部分兼容服务即使开启 json_schema 仍会包一层 ```json 代码块
pub(crate) fn parse_json_content(stage: GradingStage, content: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let body = fence_regex()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    serde_json::from_str(body).map_err(|e| {
        warn!("LLM 返回的不是 JSON: {}", truncate_text(body, 200));
        AppError::malformed(stage, format!("返回内容不是 JSON: {}", e), Some(content.to_string()))
    })
}

/// 把 async-openai 的错误归类到应用错误
pub(crate) fn classify_openai_error(
    model: &str,
    stage: GradingStage,
    err: OpenAIError,
) -> AppError {
    match err {
        OpenAIError::Reqwest(e) => AppError::transient(model, format!("网络错误: {}", e)),
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let kind = api.r#type.as_deref().unwrap_or_default();
            match (code, kind) {
                ("invalid_api_key", _) | (_, "authentication_error") | ("model_not_found", _) => {
                    AppError::configuration(format!("LLM 凭据或模型无效: {}", api))
                }
                (_, "invalid_request_error") => {
                    AppError::configuration(format!("LLM 请求被拒绝: {}", api))
                }
                _ => AppError::transient(model, api.to_string()),
            }
        }
        OpenAIError::JSONDeserialize(e, content) => AppError::malformed(
            stage,
            format!("无法解析 API 响应: {}", e),
            Some(content),
        ),
        OpenAIError::InvalidArgument(msg) => {
            AppError::configuration(format!("LLM 请求参数无效: {}", msg))
        }
        other => AppError::transient(model, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::grade_result_schema;
    use async_openai::error::ApiError;

    fn api_error(code: Option<&str>, kind: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: "boom".to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_parse_plain_json() {
        let value = parse_json_content(GradingStage::Judge, r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"rewrite\": {\"rep_response_v1\": \"Totally fair.\"}}\n```";
        let value = parse_json_content(GradingStage::Coach, content).unwrap();
        assert_eq!(value["rewrite"]["rep_response_v1"], "Totally fair.");
    }

    #[test]
    fn test_parse_non_json_keeps_raw() {
        let err = parse_json_content(GradingStage::Judge, "Sure! Here is the grade:").unwrap_err();
        assert!(matches!(err, AppError::MalformedModelOutput { .. }));
        assert_eq!(err.raw_output(), Some("Sure! Here is the grade:"));
    }

    #[test]
    fn test_classify_auth_as_configuration() {
        let err = classify_openai_error(
            "m",
            GradingStage::Judge,
            api_error(Some("invalid_api_key"), None),
        );
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_classify_rate_limit_as_transient() {
        let err = classify_openai_error(
            "m",
            GradingStage::Judge,
            api_error(Some("rate_limit_exceeded"), Some("requests")),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_deserialize_as_malformed() {
        let json_err = serde_json::from_str::<JsonValue>("{").unwrap_err();
        let err = classify_openai_error(
            "m",
            GradingStage::Coach,
            OpenAIError::JSONDeserialize(json_err, "{".to_string()),
        );
        assert!(matches!(
            err,
            AppError::MalformedModelOutput { stage: GradingStage::Coach, .. }
        ));
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            LlmService::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    /// 测试真实 API 的结构化输出
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_structured_output -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_structured_output() {
        crate::utils::logging::init();

        let config = Config::from_env();
        let service = LlmService::new(&config).expect("需要 LLM_API_KEY");
        let prompt = PromptSpec {
            stage: GradingStage::Judge,
            system: "You grade door-to-door pest control objection handling. Output JSON only."
                .to_string(),
            user: "OBJECTION: It's too expensive.\n\
                   REP RESPONSE: Totally fair. Is it the monthly price or the upfront cost?"
                .to_string(),
            temperature: 0.1,
        };

        let schema = grade_result_schema();
        let value = service.generate(&prompt, &schema).await.expect("调用失败");
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
        assert!(value.get("dimension_scores").is_some());
    }
}
