//! 模型响应
//!
//! [`prompt`] 把模型的原始输出包装成事件序列：若干 `Chunk`，最后是携带完整
//! 响应的 `Done`。`Done` 里的 [`CompletedResponse`] 可以写入日志数据库。

use super::traits::{Model, ModelOutput, ModelOutputs, Prompt, Usage};
use super::ModelError;
use crate::database::schema::ensure_log_tables;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// 对话名称最大长度（字符）
pub const CONVERSATION_NAME_LENGTH: usize = 32;

/// 响应事件
#[derive(Debug, Clone, PartialEq)]
pub enum PromptEvent {
    /// 一段文本
    Chunk(String),
    /// 结束标记，携带可持久化的完整响应
    Done(Box<CompletedResponse>),
}

/// 响应事件迭代器（阻塞）
pub type PromptEvents = Box<dyn Iterator<Item = Result<PromptEvent, ModelError>> + Send>;

/// 完成的模型调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedResponse {
    pub id: String,
    pub conversation_id: String,
    pub model_id: String,
    pub prompt: Prompt,
    pub text: String,
    pub response_json: Option<serde_json::Value>,
    pub usage: Option<Usage>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// 生成新的对话 ID（小写字母和数字）
pub fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 生成新的响应 ID
pub fn new_response_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 根据第一条提示词生成对话名称
///
/// 空白折叠为单个空格，超长时截断并以省略号结尾。
pub fn conversation_name(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= CONVERSATION_NAME_LENGTH {
        return collapsed;
    }
    let mut name: String = collapsed
        .chars()
        .take(CONVERSATION_NAME_LENGTH - 1)
        .collect();
    name.push('…');
    name
}

/// 运行一次模型调用
///
/// 阻塞：内部调用 `Model::execute`，应在工作线程上执行。
pub fn prompt(model: Arc<dyn Model>, prompt: Prompt) -> Result<PromptEvents, ModelError> {
    let started_at = Utc::now();
    let clock = Instant::now();
    let outputs = model.execute(&prompt)?;
    Ok(Box::new(ResponseEvents {
        model_id: model.model_id().to_string(),
        prompt: Some(prompt),
        outputs,
        text: String::new(),
        response_json: None,
        usage: None,
        started_at,
        clock,
        finished: false,
    }))
}

struct ResponseEvents {
    model_id: String,
    prompt: Option<Prompt>,
    outputs: ModelOutputs,
    text: String,
    response_json: Option<serde_json::Value>,
    usage: Option<Usage>,
    started_at: DateTime<Utc>,
    clock: Instant,
    finished: bool,
}

impl ResponseEvents {
    fn complete(&mut self) -> CompletedResponse {
        let prompt = self.prompt.take().unwrap_or_default();
        let conversation_id = prompt
            .conversation_id
            .clone()
            .unwrap_or_else(new_conversation_id);
        CompletedResponse {
            id: new_response_id(),
            conversation_id,
            model_id: self.model_id.clone(),
            prompt,
            text: std::mem::take(&mut self.text),
            response_json: self.response_json.take(),
            usage: self.usage.take(),
            started_at: self.started_at,
            duration_ms: self.clock.elapsed().as_millis() as i64,
        }
    }
}

impl Iterator for ResponseEvents {
    type Item = Result<PromptEvent, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.outputs.next() {
                Some(Ok(ModelOutput::Text(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.text.push_str(&chunk);
                    return Some(Ok(PromptEvent::Chunk(chunk)));
                }
                Some(Ok(ModelOutput::Details {
                    response_json,
                    usage,
                })) => {
                    self.response_json = Some(response_json);
                    if usage.is_some() {
                        self.usage = usage;
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return Some(Ok(PromptEvent::Done(Box::new(self.complete()))));
                }
            }
        }
    }
}

impl CompletedResponse {
    /// 写入日志数据库
    ///
    /// 日志表不存在时先建表；对话不存在时以第一条提示词命名并创建。
    pub fn log_to_db(&self, conn: &Connection) -> Result<(), rusqlite::Error> {
        ensure_log_tables(conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO conversations (id, name, model) VALUES (?1, ?2, ?3)",
            params![
                self.conversation_id,
                conversation_name(&self.prompt.prompt),
                self.model_id
            ],
        )?;

        let prompt_json = serde_json::to_string(&self.prompt).ok();
        let response_json = self
            .response_json
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());
        let usage = self.usage.unwrap_or_default();
        conn.execute(
            "INSERT INTO responses
             (id, model, prompt, system, prompt_json, options_json, response, response_json,
              conversation_id, duration_ms, datetime_utc, input_tokens, output_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                self.id,
                self.model_id,
                self.prompt.prompt,
                self.prompt.system,
                prompt_json,
                "{}",
                self.text,
                response_json,
                self.conversation_id,
                self.duration_ms,
                self.started_at
                    .naive_utc()
                    .format("%Y-%m-%dT%H:%M:%S%.6f")
                    .to_string(),
                usage.input_tokens,
                usage.output_tokens,
            ],
        )?;
        Ok(())
    }

    /// `/-/llm/chat` 返回的 details
    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "model": self.model_id,
            "conversation_id": self.conversation_id,
            "duration_ms": self.duration_ms,
            "datetime_utc": self.started_at.to_rfc3339(),
            "usage": self.usage,
            "response_json": self.response_json,
        })
    }
}
