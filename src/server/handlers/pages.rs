//! HTML 页面处理器

use super::is_valid_conversation_id;
use crate::database::dao::{ConversationDao, InitiatedDao};
use crate::models::{PendingStart, Transcript};
use crate::providers::new_conversation_id;
use crate::server::flash::{self, FlashMessage};
use crate::server::{ApiError, AppState, BASE_PATH};
use crate::templates::{CONVERSATION_TEMPLATE, INDEX_TEMPLATE};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use minijinja::context;
use std::collections::HashMap;

/// 请求者身份头，写入待开始记录的 actor_id
pub const ACTOR_HEADER: &str = "x-actor-id";

/// 首页列出的对话数量
const INDEX_CONVERSATION_LIMIT: usize = 50;

/// 首页
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let messages = flash::read(&headers);
    let conversations = match &state.db {
        Some(db) => {
            db.execute_fn(|conn| {
                Ok(ConversationDao::list_summaries(
                    conn,
                    INDEX_CONVERSATION_LIMIT,
                )?)
            })
            .await?
        }
        None => Vec::new(),
    };

    let html = state.templates.render(
        INDEX_TEMPLATE,
        context! {
            messages => &messages,
            db_attached => state.db.is_some(),
            base_path => BASE_PATH,
            start_path => format!("{}/start", BASE_PATH),
            default_model => &state.config.plugins.llm.default_model,
            models => state.models.list(),
            conversations => conversations,
        },
    )?;
    Ok(with_flash_cleared(Html(html), !messages.is_empty()))
}

/// 非 POST 的 start 请求回到首页
pub async fn start_redirect() -> Redirect {
    Redirect::to(BASE_PATH)
}

/// 创建待开始对话并跳转到对话页面
pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let (Some(model_id), Some(prompt)) = (form.get("model_id"), form.get("prompt")) else {
        return Ok(redirect_with_error("Invalid start to the conversation"));
    };
    if prompt.trim().is_empty() {
        return Ok(redirect_with_error("Invalid start to the conversation"));
    }
    // 只做校验，记录表单中的原值（可以是别名）
    if let Err(e) = state.models.get(model_id) {
        tracing::debug!("[LLM] {}", e);
        return Ok(redirect_with_error("Unknown model"));
    }
    let Some(db) = &state.db else {
        tracing::warn!("[LLM] 日志数据库未挂载，无法创建对话");
        return Ok(redirect_with_error("The llm database is not available"));
    };

    let requester_id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty());
    let pending = PendingStart::new(
        new_conversation_id(),
        model_id.as_str(),
        prompt.as_str(),
        form.get("system").cloned(),
        requester_id,
    );
    let conversation_id = pending.conversation_id.clone();

    db.execute_write_fn(move |conn| Ok(InitiatedDao::insert(conn, &pending)?))
        .await?;
    tracing::info!(
        "[LLM] 新对话 {} (model={})",
        conversation_id,
        model_id
    );

    Ok(Redirect::to(&format!("{}/{}", BASE_PATH, conversation_id)).into_response())
}

/// 对话页面
pub async fn conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_conversation_id(&conversation_id) {
        return Err(ApiError::not_found());
    }
    let Some(db) = &state.db else {
        return Err(ApiError::not_found());
    };

    let id = conversation_id.clone();
    let transcript = db
        .execute_fn(move |conn| {
            Ok(Transcript::assemble(
                &id,
                InitiatedDao::get(conn, &id)?,
                ConversationDao::get(conn, &id)?,
                ConversationDao::responses(conn, &id)?,
            ))
        })
        .await?
        .ok_or_else(ApiError::not_found)?;

    let messages = flash::read(&headers);
    let html = state.templates.render(
        CONVERSATION_TEMPLATE,
        context! {
            messages => &messages,
            base_path => BASE_PATH,
            ws_path => format!("{}/ws/{}", BASE_PATH, conversation_id),
            transcript => transcript,
        },
    )?;
    Ok(with_flash_cleared(Html(html), !messages.is_empty()))
}

fn redirect_with_error(message: &str) -> Response {
    let mut response = Redirect::to(BASE_PATH).into_response();
    if let Some(cookie) = flash::set_cookie(&[FlashMessage::error(message)]) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

fn with_flash_cleared(page: Html<String>, had_messages: bool) -> Response {
    let mut response = page.into_response();
    if had_messages {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, flash::clear_cookie());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::LogDatabase;
    use crate::providers::{EchoModel, ModelRegistry};
    use crate::server::build_router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(db: Option<LogDatabase>) -> AppState {
        let mut models = ModelRegistry::new();
        models.register(Arc::new(EchoModel), &["m"]);
        AppState::new(Config::default(), db, models).unwrap()
    }

    fn start_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/-/llm/start")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACTOR_HEADER, "simon")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_start_persists_pending_and_redirects() {
        let db = LogDatabase::open_in_memory().unwrap();
        let app = build_router(state(Some(db.clone())));

        let response = app
            .oneshot(start_request("model_id=echo&prompt=hello+there&system=be+brief"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        let id = location.strip_prefix("/-/llm/").unwrap().to_string();
        assert!(is_valid_conversation_id(&id));

        let pending = db
            .execute_fn(move |conn| Ok(InitiatedDao::get(conn, &id)?))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.model_id, "echo");
        assert_eq!(pending.prompt, "hello there");
        assert_eq!(pending.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(pending.requester_id.as_deref(), Some("simon"));
    }

    #[tokio::test]
    async fn test_start_keeps_form_values() {
        let db = LogDatabase::open_in_memory().unwrap();
        let app = build_router(state(Some(db.clone())));

        let response = app
            .oneshot(start_request("model_id=m&prompt=hello&system="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        let id = location.strip_prefix("/-/llm/").unwrap().to_string();

        let pending = db
            .execute_fn(move |conn| Ok(InitiatedDao::get(conn, &id)?))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.model_id, "m");
        assert_eq!(pending.system_prompt.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_model() {
        let db = LogDatabase::open_in_memory().unwrap();
        let app = build_router(state(Some(db.clone())));

        let response = app
            .oneshot(start_request("model_id=nope&prompt=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/-/llm");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("ds_messages="));

        let rows = db
            .execute_fn(|conn| {
                Ok(conn
                    .query_row("SELECT count(*) FROM initiated", [], |r| r.get::<_, i64>(0))
                    .unwrap_or(0))
            })
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_start_rejects_missing_fields() {
        let app = build_router(state(Some(LogDatabase::open_in_memory().unwrap())));
        let response = app.oneshot(start_request("model_id=echo")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/-/llm");
    }

    #[tokio::test]
    async fn test_get_start_redirects_to_index() {
        let app = build_router(state(None));
        let response = app
            .oneshot(Request::get("/-/llm/start").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/-/llm");
    }

    #[tokio::test]
    async fn test_index_shows_flash_message_once() {
        let app = build_router(state(None));
        let cookie = flash::set_cookie(&[FlashMessage::error("Unknown model")]).unwrap();
        let cookie = cookie.to_str().unwrap().split(';').next().unwrap().to_string();

        let response = app
            .oneshot(
                Request::get("/-/llm")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        let html = body_text(response).await;
        assert!(html.contains("Unknown model"));
        assert!(html.contains("log database is not attached"));
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let app = build_router(state(Some(LogDatabase::open_in_memory().unwrap())));
        for uri in ["/-/llm/abc123", "/-/llm/NOT-VALID"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }
}
