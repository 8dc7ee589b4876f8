//! WebSocket 对话通道
//!
//! 每个连接对应一个对话：
//! - 握手前校验对话是否存在、连接数是否超限
//! - 自动运行待开始的第一条提示词
//! - 逐段转发模型输出，每轮以分隔帧结束

mod handler;
mod session;
mod types;

pub use handler::ws_handler;
pub use session::{ConversationSession, SessionError};
pub use types::{
    parse_client_message, ClientFrame, ClientMessage, ProtocolError, SessionInfo, SessionState,
    WsStats, WsStatsSnapshot, ERROR_PREFIX, TURN_SENTINEL,
};

use crate::config::WebSocketConfig;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 注册错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Maximum connections ({0}) reached")]
    Full(usize),
}

/// 活跃会话注册表
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionInfo>,
    config: WebSocketConfig,
    stats: Arc<WsStats>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            stats: Arc::new(WsStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// 注册新会话
    ///
    /// 返回的守卫在释放时注销会话，即使握手最终没有完成。
    pub fn register(
        self: &Arc<Self>,
        conversation_id: &str,
    ) -> Result<SessionGuard, RegistryError> {
        if self.sessions.len() >= self.config.max_connections {
            self.stats.on_error();
            return Err(RegistryError::Full(self.config.max_connections));
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                conversation_id: conversation_id.to_string(),
                connected_at: Utc::now(),
            },
        );
        self.stats.on_connect();
        Ok(SessionGuard {
            id,
            cancel: self.shutdown.child_token(),
            registry: self.clone(),
        })
    }

    fn unregister(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            self.stats.on_disconnect();
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn stats(&self) -> &Arc<WsStats> {
        &self.stats
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// 通知所有会话结束
    pub fn shutdown(&self) {
        for info in self.list() {
            tracing::info!("[WS] 关闭会话 {} (conversation {})", info.id, info.conversation_id);
        }
        tracing::info!("[WS] 关闭前统计: {:?}", self.stats.snapshot());
        self.shutdown.cancel();
    }
}

/// 会话注册守卫
#[derive(Debug)]
pub struct SessionGuard {
    id: String,
    cancel: CancellationToken,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 服务关闭时触发
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}
