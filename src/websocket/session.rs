//! 对话会话
//!
//! 一个 WebSocket 连接对应一个 [`ConversationSession`]。会话对底层通道只要求
//! `Stream<Item = ClientFrame>` 和 `Sink<String>`，因此可以用内存通道测试。
//!
//! 状态转换：
//! - 连接时加载待开始记录；有记录且尚无响应时自动运行第一条提示词（最多一次）
//! - 否则等待客户端发送 `{"prompt": ...}`
//! - 运行中逐段转发文本；结束标记交给存储层写入，不转发
//! - 自动运行的第一轮等写入完成再发送分隔帧，之后的轮次不等待
//! - 一轮结束发送分隔帧，回到等待状态
//! - 客户端断开时退出，正在运行的调用输出被丢弃

use super::types::{
    parse_client_message, ClientFrame, ProtocolError, SessionState, WsStats, TURN_SENTINEL,
};
use crate::config::WebSocketConfig;
use crate::database::dao::{ConversationDao, InitiatedDao};
use crate::database::{LogDatabase, StoreError};
use crate::models::PendingStart;
use crate::providers::{
    CompletedResponse, Exchange, Model, ModelError, ModelRegistry, Prompt, PromptEvent,
};
use crate::streaming::{stream_prompt, BridgeItem};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 会话建立失败，在握手前返回
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum TurnOutcome {
    Completed,
    Disconnected,
}

/// 一个对话通道的会话
pub struct ConversationSession {
    conversation_id: String,
    model: Arc<dyn Model>,
    /// 只能被消费一次
    first_prompt: Option<PendingStart>,
    history: Vec<Exchange>,
    db: Option<LogDatabase>,
    state: SessionState,
    queued: VecDeque<ClientFrame>,
    max_message_size: usize,
    stats: Arc<WsStats>,
    cancel: CancellationToken,
}

impl ConversationSession {
    pub fn new(conversation_id: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            model,
            first_prompt: None,
            history: Vec::new(),
            db: None,
            state: SessionState::AwaitingConnect,
            queued: VecDeque::new(),
            max_message_size: WebSocketConfig::default().max_message_size,
            stats: Arc::new(WsStats::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// 从日志数据库加载会话
    ///
    /// 既没有待开始记录也没有对话时返回 `NotFound`；模型无法解析时返回模型错误。
    pub async fn load(
        db: Option<&LogDatabase>,
        registry: &ModelRegistry,
        conversation_id: &str,
    ) -> Result<Self, SessionError> {
        let db = db.ok_or_else(|| SessionError::NotFound(conversation_id.to_string()))?;
        let id = conversation_id.to_string();
        let (pending, conversation, responses) = db
            .execute_fn(move |conn| {
                Ok((
                    InitiatedDao::get(conn, &id)?,
                    ConversationDao::get(conn, &id)?,
                    ConversationDao::responses(conn, &id)?,
                ))
            })
            .await?;

        let model_id = conversation
            .map(|c| c.model_id)
            .filter(|m| !m.is_empty())
            .or_else(|| responses.first().map(|r| r.model_id.clone()))
            .or_else(|| pending.as_ref().map(|p| p.model_id.clone()))
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()))?;
        let model = registry.get(&model_id)?;

        let history = responses
            .iter()
            .map(|r| Exchange {
                prompt: r.prompt.clone().unwrap_or_default(),
                response: r.response.clone().unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        let first_prompt = pending.filter(|_| responses.is_empty());

        tracing::debug!(
            "[WS] 加载会话 {}: model={} history={} pending_first_prompt={}",
            conversation_id,
            model_id,
            history.len(),
            first_prompt.is_some()
        );

        Ok(Self::new(conversation_id, model)
            .with_first_prompt(first_prompt)
            .with_history(history)
            .with_db(Some(db.clone())))
    }

    pub fn with_first_prompt(mut self, pending: Option<PendingStart>) -> Self {
        self.first_prompt = pending;
        self
    }

    pub fn with_history(mut self, history: Vec<Exchange>) -> Self {
        self.history = history;
        self
    }

    pub fn with_db(mut self, db: Option<LogDatabase>) -> Self {
        self.db = db;
        self
    }

    /// 仅用于错误帧中的提示，超限帧由通道适配层识别
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_stats(mut self, stats: Arc<WsStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_pending_first_prompt(&self) -> bool {
        self.first_prompt.is_some()
    }

    /// 运行会话直到客户端断开，返回完成的轮次数
    pub async fn run<S, K>(mut self, mut inbound: S, mut outbound: K) -> u64
    where
        S: Stream<Item = ClientFrame> + Unpin,
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        let mut turns = 0u64;
        self.state = if self.first_prompt.is_some() {
            SessionState::AcceptedWithPendingFirstPrompt
        } else {
            SessionState::AcceptedAwaitingClientPrompt
        };

        if let Some(pending) = self.first_prompt.take() {
            tracing::info!("[WS] 自动运行对话 {} 的第一条提示词", self.conversation_id);
            let prompt = Prompt::new(pending.prompt).with_system(pending.system_prompt);
            match self.run_turn(prompt, true, &mut inbound, &mut outbound).await {
                TurnOutcome::Completed => turns += 1,
                TurnOutcome::Disconnected => return self.close(turns),
            }
        }

        loop {
            let frame = match self.queued.pop_front() {
                Some(frame) => frame,
                None => {
                    tokio::select! {
                        frame = inbound.next() => match frame {
                            Some(frame) => frame,
                            None => break,
                        },
                        _ = self.cancel.cancelled() => break,
                    }
                }
            };

            let prompt = match frame {
                ClientFrame::Close => break,
                ClientFrame::Text(text) => parse_client_message(&text),
                ClientFrame::Binary => Err(ProtocolError::Binary),
                ClientFrame::Oversize(size) => Err(ProtocolError::TooLarge {
                    size,
                    max: self.max_message_size,
                }),
            };

            match prompt {
                Ok(prompt) => {
                    let prompt = Prompt::new(prompt);
                    match self.run_turn(prompt, false, &mut inbound, &mut outbound).await {
                        TurnOutcome::Completed => turns += 1,
                        TurnOutcome::Disconnected => break,
                    }
                }
                Err(e) => {
                    self.stats.on_error();
                    tracing::warn!("[WS] 对话 {} 协议错误: {}", self.conversation_id, e);
                    if send_frame(&mut outbound, e.to_frame()).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.close(turns)
    }

    fn close(mut self, turns: u64) -> u64 {
        self.state = SessionState::Closed;
        tracing::info!(
            "[WS] 对话 {} 会话结束，完成 {} 轮",
            self.conversation_id,
            turns
        );
        turns
    }

    /// `wait_for_write` 为 true 时，响应写入完成后才发送分隔帧
    async fn run_turn<S, K>(
        &mut self,
        prompt: Prompt,
        wait_for_write: bool,
        inbound: &mut S,
        outbound: &mut K,
    ) -> TurnOutcome
    where
        S: Stream<Item = ClientFrame> + Unpin,
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        tracing::debug!(
            "[WS] 对话 {} 状态: {:?} -> Running",
            self.conversation_id,
            self.state
        );
        self.state = SessionState::Running;
        let prompt = prompt
            .with_history(self.history.clone())
            .in_conversation(self.conversation_id.clone());

        let mut events = match stream_prompt(self.model.clone(), prompt) {
            Ok(events) => events,
            Err(e) => {
                self.stats.on_error();
                tracing::error!("[WS] {}", e);
                if send_frame(outbound, e.to_string()).await.is_err()
                    || send_frame(outbound, TURN_SENTINEL.to_string()).await.is_err()
                {
                    return TurnOutcome::Disconnected;
                }
                self.state = SessionState::AcceptedAwaitingClientPrompt;
                return TurnOutcome::Completed;
            }
        };

        let cancel = self.cancel.clone();
        let mut write = None;
        loop {
            tokio::select! {
                item = events.next() => match item {
                    Some(BridgeItem::Item(PromptEvent::Chunk(text))) => {
                        if send_frame(outbound, text).await.is_err() {
                            return TurnOutcome::Disconnected;
                        }
                    }
                    Some(BridgeItem::Item(PromptEvent::Done(response))) => {
                        self.history.push(Exchange {
                            prompt: response.prompt.prompt.clone(),
                            response: response.text.clone(),
                        });
                        write = self.persist(*response);
                    }
                    Some(BridgeItem::Error(message)) => {
                        self.stats.on_error();
                        tracing::warn!("[WS] 对话 {} 模型调用失败: {}", self.conversation_id, message);
                        if send_frame(outbound, message).await.is_err() {
                            return TurnOutcome::Disconnected;
                        }
                    }
                    None => break,
                },
                frame = inbound.next() => match frame {
                    None | Some(ClientFrame::Close) => {
                        tracing::debug!("[WS] 对话 {} 在响应过程中断开", self.conversation_id);
                        return TurnOutcome::Disconnected;
                    }
                    Some(frame) => self.queued.push_back(frame),
                },
                _ = cancel.cancelled() => return TurnOutcome::Disconnected,
            }
        }

        // 第一轮写入前重连会再次自动运行待开始的提示词
        if let (true, Some(write)) = (wait_for_write, write) {
            if let Err(e) = write.await {
                tracing::error!("[DB] 写入任务异常: {}", e);
            }
        }

        if send_frame(outbound, TURN_SENTINEL.to_string()).await.is_err() {
            return TurnOutcome::Disconnected;
        }
        self.stats.on_turn();
        self.state = SessionState::AcceptedAwaitingClientPrompt;
        TurnOutcome::Completed
    }

    /// 交给写入入口，调用方决定是否等待
    fn persist(&self, response: CompletedResponse) -> Option<JoinHandle<()>> {
        let Some(db) = self.db.clone() else {
            tracing::warn!(
                "[WS] 日志数据库未挂载，对话 {} 的响应未保存",
                self.conversation_id
            );
            return None;
        };
        Some(tokio::spawn(async move {
            let conversation_id = response.conversation_id.clone();
            let result = db
                .execute_write_fn(move |conn| {
                    response.log_to_db(conn)?;
                    Ok(response.id)
                })
                .await;
            match result {
                Ok(id) => tracing::info!("[DB] 已保存响应 {} (conversation {})", id, conversation_id),
                Err(e) => tracing::error!("[DB] 保存对话 {} 的响应失败: {}", conversation_id, e),
            }
        }))
    }
}

async fn send_frame<K>(outbound: &mut K, text: String) -> Result<(), ()>
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    outbound.send(text).await.map_err(|e| {
        tracing::debug!("[WS] 发送失败: {}", e);
    })
}
