use std::fmt;

use thiserror::Error;

/// 出错的生成阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStage {
    /// 评分（Judge）阶段
    Judge,
    /// 教练（Coach）阶段
    Coach,
    /// 合并后的最终校验
    Final,
}

impl GradingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GradingStage::Judge => "judge",
            GradingStage::Coach => "coach",
            GradingStage::Final => "final",
        }
    }
}

impl fmt::Display for GradingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 缺少凭据 / 模型名等配置，不可重试
    #[error("配置错误: {message}")]
    Configuration { message: String },

    /// 调用方输入不合法，在任何 LLM 调用之前拒绝
    #[error("输入校验失败: {message}")]
    Validation { message: String },

    /// 模型输出不符合 schema
    #[error("模型输出不合法 ({stage}): {reason}")]
    MalformedModelOutput {
        stage: GradingStage,
        reason: String,
        /// 原始输出，便于排查
        raw: Option<String>,
    },

    /// 网络 / 超时 / 限流等瞬时错误，调用方可以重试
    #[error("LLM 服务暂时不可用 (模型: {model}): {message}")]
    TransientProvider { model: String, message: String },

    /// 调用方无权访问该团队 / 项目
    #[error("无权访问: {message}")]
    Authorization { message: String },

    /// 存储层错误
    #[error("存储错误 ({path}): {message}")]
    Store { path: String, message: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML解析失败: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// 创建输入校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
        }
    }

    /// 创建模型输出不合法错误
    pub fn malformed(stage: GradingStage, reason: impl Into<String>, raw: Option<String>) -> Self {
        AppError::MalformedModelOutput {
            stage,
            reason: reason.into(),
            raw,
        }
    }

    /// 创建瞬时错误
    pub fn transient(model: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::TransientProvider {
            model: model.into(),
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn authorization(message: impl Into<String>) -> Self {
        AppError::Authorization {
            message: message.into(),
        }
    }

    /// 创建存储错误
    pub fn store(path: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Store {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 只有瞬时错误值得整体重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientProvider { .. })
    }

    /// 原始模型输出（仅 MalformedModelOutput 有）
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            AppError::MalformedModelOutput { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(AppError::transient("m", "timeout").is_retryable());
        assert!(!AppError::configuration("no key").is_retryable());
        assert!(!AppError::malformed(GradingStage::Judge, "bad", None)
            .is_retryable());
        assert!(!AppError::authorization("not a member").is_retryable());
    }

    #[test]
    fn test_malformed_keeps_raw_output() {
        let err = AppError::malformed(GradingStage::Coach, "not json", Some("oops".to_string()));
        assert_eq!(err.raw_output(), Some("oops"));
        assert!(err.to_string().contains("coach"));
    }
}
