//! HTTP 错误响应
//!
//! 所有 JSON 错误都渲染为 `{"error": "..."}`。

use crate::database::StoreError;
use crate::providers::ModelError;
use crate::streaming::BridgeError;
use crate::websocket::{RegistryError, SessionError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// API 错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 请求校验失败
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    /// 模型调用失败
    #[error("{0}")]
    Model(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    UpgradeRequired(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Model(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpgradeRequired(_) => StatusCode::UPGRADE_REQUIRED,
        }
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("Not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[HTTP] {} {}", status.as_u16(), self);
        } else {
            tracing::debug!("[HTTP] {} {}", status.as_u16(), self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Model(err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ApiError::not_found(),
            SessionError::Model(e) => e.into(),
            SessionError::Store(e) => e.into(),
        }
    }
}

impl From<minijinja::Error> for ApiError {
    fn from(err: minijinja::Error) -> Self {
        ApiError::Internal(format!("Template rendering failed: {}", err))
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_status() {
        let unknown: ApiError = ModelError::UnknownModel("x".into()).into();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.to_string(), "Unknown model: x");

        let failed: ApiError = ModelError::ServerError("boom".into()).into();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_session_error_status() {
        let missing: ApiError = SessionError::NotFound("abc".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let full: ApiError = RegistryError::Full(1).into();
        assert_eq!(full.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
