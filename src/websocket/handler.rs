//! WebSocket 请求处理器
//!
//! 握手前完成所有校验，失败时返回普通 HTTP 错误而不升级。

use super::session::ConversationSession;
use super::types::ClientFrame;
use super::SessionGuard;
use crate::server::handlers::is_valid_conversation_id;
use crate::server::{ApiError, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{future, SinkExt, StreamExt};

/// WebSocket 升级处理器
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if !is_valid_conversation_id(&conversation_id) {
        return ApiError::not_found().into_response();
    }

    let session =
        match ConversationSession::load(state.db.as_ref(), &state.models, &conversation_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::info!("[WS] 拒绝对话 {} 的连接: {}", conversation_id, e);
                return ApiError::from(e).into_response();
            }
        };

    let Some(ws) = ws else {
        return ApiError::UpgradeRequired("Expected a WebSocket upgrade request".to_string())
            .into_response();
    };

    let guard = match state.sessions.register(&conversation_id) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!("[WS] {}", e);
            return ApiError::from(e).into_response();
        }
    };

    let max_message_size = state.sessions.config().max_message_size;
    let session = session
        .with_max_message_size(max_message_size)
        .with_stats(state.sessions.stats().clone())
        .with_cancellation(guard.cancellation());

    ws.on_upgrade(move |socket| handle_socket(socket, session, guard, max_message_size))
        .into_response()
}

/// 处理 WebSocket 连接
async fn handle_socket(
    socket: WebSocket,
    session: ConversationSession,
    guard: SessionGuard,
    max_message_size: usize,
) {
    let conn_id = guard.id().to_string();
    tracing::info!(
        "[WS] New connection: {} (conversation {})",
        &conn_id[..8],
        session.conversation_id()
    );

    let (sender, receiver) = socket.split();
    let inbound = receiver.filter_map(move |msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) if text.len() > max_message_size => {
                Some(ClientFrame::Oversize(text.len()))
            }
            Ok(Message::Text(text)) => Some(ClientFrame::Text(text)),
            Ok(Message::Binary(_)) => Some(ClientFrame::Binary),
            // ping 由底层自动回复
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Ok(Message::Close(_)) => Some(ClientFrame::Close),
            Err(e) => {
                tracing::debug!("[WS] 连接错误: {}", e);
                Some(ClientFrame::Close)
            }
        })
    });
    let outbound =
        sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));

    let inbound = std::pin::pin!(inbound);
    let outbound = std::pin::pin!(outbound);
    session.run(inbound, outbound).await;

    tracing::info!("[WS] Connection closed: {}", &conn_id[..8]);
    drop(guard);
}
