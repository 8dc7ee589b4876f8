//! WebSocket 类型定义
//!
//! 对话通道上的帧、会话状态和统计

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 一轮响应结束后发送的分隔帧
pub const TURN_SENTINEL: &str = "\n\n";

/// 协议错误帧前缀
pub const ERROR_PREFIX: &str = "Error: ";

/// 客户端发来的帧（已从底层 WebSocket 消息转换）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// 文本帧
    Text(String),
    /// 二进制帧，不支持
    Binary,
    /// 超过大小限制的文本帧（字节数）
    Oversize(usize),
    /// 客户端关闭
    Close,
}

/// 客户端消息
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// 协议错误，以错误帧回复，不关闭通道
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON message: {0}")]
    InvalidJson(String),
    #[error("message is missing a prompt")]
    MissingPrompt,
    #[error("binary messages are not supported")]
    Binary,
    #[error("message too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// 错误帧文本
    pub fn to_frame(&self) -> String {
        format!("{}{}", ERROR_PREFIX, self)
    }
}

/// 解析客户端文本帧，返回提示词
pub fn parse_client_message(text: &str) -> Result<String, ProtocolError> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    message
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or(ProtocolError::MissingPrompt)
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingConnect,
    /// 已接受连接，待开始的第一条提示词将自动运行
    AcceptedWithPendingFirstPrompt,
    AcceptedAwaitingClientPrompt,
    Running,
    Closed,
}

/// 活跃会话信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub conversation_id: String,
    pub connected_at: DateTime<Utc>,
}

/// WebSocket 统计
#[derive(Debug, Default)]
pub struct WsStats {
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    /// 完成的轮次
    pub total_turns: AtomicU64,
    pub total_errors: AtomicU64,
}

impl WsStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn on_turn(&self) {
        self.total_turns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> WsStatsSnapshot {
        WsStatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_turns: self.total_turns.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照（可序列化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsStatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_turns: u64,
    pub total_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_message() {
        assert_eq!(parse_client_message(r#"{"prompt": "hi"}"#), Ok("hi".to_string()));
        assert_eq!(
            parse_client_message(r#"{"text": "hi"}"#),
            Err(ProtocolError::MissingPrompt)
        );
        assert_eq!(
            parse_client_message(r#"{"prompt": "   "}"#),
            Err(ProtocolError::MissingPrompt)
        );
        assert!(matches!(
            parse_client_message("hi"),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_error_frame_prefix() {
        let frame = ProtocolError::MissingPrompt.to_frame();
        assert_eq!(frame, "Error: message is missing a prompt");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = WsStats::new();
        stats.on_connect();
        stats.on_connect();
        stats.on_disconnect();
        stats.on_turn();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.total_turns, 1);
        assert_eq!(snapshot.total_errors, 0);
    }
}
