//! HTTP 服务
//!
//! 路由：
//! - `GET /-/llm` 首页
//! - `POST /-/llm/start` 创建待开始对话
//! - `GET /-/llm/{conversation_id}` 对话页面
//! - `WS /-/llm/ws/{conversation_id}` 对话通道
//! - `POST /-/llm/chat` 同步调用
//! - `GET|POST /-/llm/stream` SSE 流式调用
//! - `GET /-/llm/-/sessions` 对话通道状态

pub mod error;
pub mod flash;
pub mod handlers;

pub use error::ApiError;

use crate::config::Config;
use crate::database::LogDatabase;
use crate::providers::ModelRegistry;
use crate::templates::Templates;
use crate::websocket::{ws_handler, SessionRegistry};
use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// 路由前缀
pub const BASE_PATH: &str = "/-/llm";

/// 请求体大小限制
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// 服务错误
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("模板加载失败: {0}")]
    Template(#[from] minijinja::Error),
    #[error("无法监听 {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("服务异常退出: {0}")]
    Serve(std::io::Error),
}

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// 挂载的 llm 日志数据库；启动时文件不存在则为 None
    pub db: Option<LogDatabase>,
    pub models: Arc<ModelRegistry>,
    pub templates: Arc<Templates>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Option<LogDatabase>,
        models: ModelRegistry,
    ) -> Result<Self, ServerError> {
        let sessions = SessionRegistry::new(config.websocket.clone());
        Ok(Self {
            config: Arc::new(config),
            db,
            models: Arc::new(models),
            templates: Arc::new(Templates::new()?),
            sessions: Arc::new(sessions),
        })
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(BASE_PATH, get(handlers::index))
        .route(
            "/-/llm/start",
            get(handlers::start_redirect).post(handlers::start),
        )
        .route("/-/llm/chat", any(handlers::chat))
        .route(
            "/-/llm/stream",
            get(handlers::stream_get).post(handlers::stream_post),
        )
        .route("/-/llm/-/sessions", get(handlers::sessions))
        .route("/-/llm/ws/:conversation_id", get(ws_handler))
        .route("/-/llm/:conversation_id", get(handlers::conversation))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动服务，收到 Ctrl-C 后关闭所有会话并退出
pub async fn serve(state: AppState) -> Result<(), ServerError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!(
        "[SERVER] 服务已启动: http://{}{} (llm database attached: {})",
        addr,
        BASE_PATH,
        state.db.is_some()
    );

    let sessions = state.sessions.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[SERVER] 无法监听退出信号: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("[SERVER] 正在关闭");
            sessions.shutdown();
        })
        .await
        .map_err(ServerError::Serve)
}
