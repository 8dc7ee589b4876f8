//! API 端点处理器
//!
//! - `/-/llm/chat`: 运行一次调用，返回 `{prompt, response, details}`
//! - `/-/llm/stream`: 同样的校验，以 SSE 逐段返回
//! - `/-/llm/-/sessions`: 活跃对话通道和累计计数
//!
//! chat/stream 都不写入日志数据库。

use crate::providers::{Model, Prompt, PromptEvent};
use crate::server::{ApiError, AppState};
use crate::streaming::{prompt_event_frames, stream_prompt, BridgeItem};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

/// chat/stream 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

/// 校验请求并解析模型
fn resolve_request(
    state: &AppState,
    request: ChatRequest,
) -> Result<(Arc<dyn Model>, Prompt), ApiError> {
    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("prompt is required".to_string()))?;
    let model_id = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.plugins.llm.default_model.clone());
    let model = state.models.get(&model_id)?;
    Ok((model, Prompt::new(prompt).with_system(request.system)))
}

fn parse_body(body: &Bytes) -> Result<ChatRequest, ApiError> {
    if body.is_empty() {
        return Ok(ChatRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// POST /-/llm/chat
pub async fn chat(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed(
            "Method not allowed, use POST".to_string(),
        ));
    }
    let (model, prompt) = resolve_request(&state, parse_body(&body)?)?;
    let prompt_text = prompt.prompt.clone();
    tracing::info!("[LLM] chat model={}", model.model_id());

    let mut events = stream_prompt(model, prompt)?;
    while let Some(item) = events.next().await {
        match item {
            BridgeItem::Item(PromptEvent::Chunk(_)) => {}
            BridgeItem::Item(PromptEvent::Done(response)) => {
                return Ok(Json(serde_json::json!({
                    "prompt": prompt_text,
                    "response": response.text,
                    "details": response.details(),
                })));
            }
            BridgeItem::Error(message) => return Err(ApiError::Model(message)),
        }
    }
    Err(ApiError::Internal(
        "model call ended without a response".to_string(),
    ))
}

/// GET /-/llm/stream?model=...&prompt=...
pub async fn stream_get(
    State(state): State<AppState>,
    Query(request): Query<ChatRequest>,
) -> Result<Response, ApiError> {
    stream_response(&state, request)
}

/// POST /-/llm/stream
pub async fn stream_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    stream_response(&state, parse_body(&body)?)
}

fn stream_response(state: &AppState, request: ChatRequest) -> Result<Response, ApiError> {
    let (model, prompt) = resolve_request(state, request)?;
    tracing::info!("[STREAM] stream model={}", model.model_id());
    let events = stream_prompt(model, prompt)?;

    let body_stream = prompt_event_frames(events)
        .map(|frame| -> Result<Bytes, std::io::Error> { Ok(Bytes::from(frame)) });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            ApiError::Internal("Failed to build streaming response".to_string()).into_response()
        }))
}

/// GET /-/llm/-/sessions
pub async fn sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "stats": state.sessions.stats().snapshot(),
        "sessions": state.sessions.list(),
    }))
}
