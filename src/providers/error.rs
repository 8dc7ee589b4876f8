//! 模型调用错误类型
//!
//! 区分未知模型、缺少密钥和调用期间的各类失败。调用失败不会自动重试，
//! 需要用户发起新的一轮对话。

/// 模型错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// 注册表中没有该模型
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// 模型需要 API 密钥但未配置
    #[error("No key found - set {env} or add api_key to the config file")]
    MissingKey { model_id: String, env: String },

    /// 网络错误
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 认证失败（401/403）
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// 限流（429）
    #[error("Rate limited: {0}")]
    RateLimitError(String),

    /// 上游 5xx
    #[error("Server error: {0}")]
    ServerError(String),

    /// 其他 4xx
    #[error("Request failed: {0}")]
    RequestError(String),

    /// 响应无法解析
    #[error("Could not parse response: {0}")]
    ParseError(String),
}

impl ModelError {
    /// 是否属于请求校验类错误（HTTP 400），而不是调用失败（HTTP 500）
    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::UnknownModel(_))
    }

    /// 从 HTTP 状态码创建错误
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {} - {}", status, truncate_message(body, 200));
        match status {
            401 | 403 => ModelError::AuthenticationError(detail),
            429 => ModelError::RateLimitError(detail),
            500..=599 => ModelError::ServerError(detail),
            _ => ModelError::RequestError(detail),
        }
    }

    /// 从 reqwest 错误创建
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::NetworkError("request timed out".to_string())
        } else if err.is_connect() {
            ModelError::NetworkError(format!("connection failed: {}", err))
        } else if err.is_decode() {
            ModelError::ParseError(err.to_string())
        } else {
            ModelError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::NetworkError(err.to_string())
    }
}

/// 截断过长的上游错误信息
fn truncate_message(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        msg.to_string()
    } else {
        let truncated: String = msg.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            ModelError::from_http_status(401, "bad key"),
            ModelError::AuthenticationError(_)
        ));
        assert!(matches!(
            ModelError::from_http_status(429, ""),
            ModelError::RateLimitError(_)
        ));
        assert!(matches!(
            ModelError::from_http_status(503, ""),
            ModelError::ServerError(_)
        ));
        assert!(matches!(
            ModelError::from_http_status(404, ""),
            ModelError::RequestError(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let err = ModelError::from_http_status(500, &body);
        assert!(err.to_string().len() < 300);
        assert!(err.to_string().ends_with("..."));
    }

    #[test]
    fn test_only_unknown_model_is_validation() {
        assert!(ModelError::UnknownModel("x".into()).is_validation());
        assert!(!ModelError::ServerError("x".into()).is_validation());
        assert_eq!(
            ModelError::UnknownModel("x-unknown".into()).to_string(),
            "Unknown model: x-unknown"
        );
    }

    #[test]
    fn test_messages_are_english() {
        assert_eq!(
            ModelError::NetworkError("down".into()).to_string(),
            "Network error: down"
        );
        assert_eq!(
            ModelError::from_http_status(503, "busy").to_string(),
            "Server error: HTTP 503 - busy"
        );
    }
}
