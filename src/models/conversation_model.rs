//! 对话数据模型
//!
//! `initiated` 表中的待开始请求，以及 llm 日志数据库中的对话和响应记录

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 尚未产生任何响应的对话请求
///
/// 第一次响应写入后即被 Conversation/Response 取代，但记录本身保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingStart {
    pub conversation_id: String,
    pub model_id: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub requester_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingStart {
    pub fn new(
        conversation_id: impl Into<String>,
        model_id: impl Into<String>,
        prompt: impl Into<String>,
        system_prompt: Option<String>,
        requester_id: Option<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            model_id: model_id.into(),
            prompt: prompt.into(),
            system_prompt,
            requester_id,
            created_at: Utc::now(),
        }
    }
}

/// 对话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: Option<String>,
    pub model_id: String,
}

/// 对话中的一次完整模型调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub conversation_id: String,
    pub model_id: String,
    pub prompt: Option<String>,
    pub system: Option<String>,
    pub response: Option<String>,
    pub datetime_utc: Option<String>,
    pub duration_ms: Option<i64>,
    /// 模型返回的结构化元数据
    pub response_json: Option<serde_json::Value>,
}

/// 首页对话列表中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub name: Option<String>,
    pub model_id: String,
    pub first_response_at: Option<String>,
    pub response_count: i64,
}

/// 对话页面所需的全部数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub conversation_id: String,
    pub title: String,
    pub model_id: String,
    pub responses: Vec<ResponseRecord>,
    /// 待开始的第一条提示词，页面在第一次响应写入前展示它
    pub pending_prompt: Option<String>,
    pub pending_system: Option<String>,
    /// 尚无任何响应，页面需要为即将到来的流式响应留出空位
    pub show_empty_response: bool,
}

/// 没有对话名称时的标题
pub const UNTITLED_CONVERSATION: &str = "Untitled conversation";

impl Transcript {
    /// 合并待开始记录和已持久化的对话数据
    ///
    /// 只要存在响应就以 Conversation/Response 为准；两者都不存在时返回 None。
    pub fn assemble(
        conversation_id: &str,
        pending: Option<PendingStart>,
        conversation: Option<Conversation>,
        responses: Vec<ResponseRecord>,
    ) -> Option<Self> {
        if !responses.is_empty() {
            let model_id = conversation
                .as_ref()
                .map(|c| c.model_id.clone())
                .or_else(|| responses.first().map(|r| r.model_id.clone()))
                .or_else(|| pending.as_ref().map(|p| p.model_id.clone()))
                .unwrap_or_default();
            let title = conversation
                .and_then(|c| c.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNTITLED_CONVERSATION.to_string());
            return Some(Self {
                conversation_id: conversation_id.to_string(),
                title,
                model_id,
                responses,
                pending_prompt: None,
                pending_system: None,
                show_empty_response: false,
            });
        }

        let pending = pending?;
        Some(Self {
            conversation_id: conversation_id.to_string(),
            title: UNTITLED_CONVERSATION.to_string(),
            model_id: pending.model_id,
            responses: Vec::new(),
            pending_prompt: Some(pending.prompt),
            pending_system: pending.system_prompt.filter(|s| !s.is_empty()),
            show_empty_response: true,
        })
    }
}

/// 解析 llm 写入的 ISO 8601 时间（无时区，UTC）
pub fn parse_datetime_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}
