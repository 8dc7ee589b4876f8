//! Model Trait 定义
//!
//! 模型通过字符串 ID 在运行时解析，因此这里使用 trait 对象而不是泛型。
//! 模型调用是阻塞的：`execute` 在调用线程上发起请求，返回的迭代器每次
//! `next()` 都可能阻塞等待下一段文本。调用方负责把它放到工作线程上运行
//! （见 `streaming::bridge`）。

use super::ModelError;
use serde::{Deserialize, Serialize};

/// 模型能力标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// 是否逐段返回文本
    pub can_stream: bool,
    /// 是否需要 API 密钥
    pub needs_key: bool,
}

/// 对话中已完成的一轮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
}

/// 一次模型调用的输入
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt: String,
    pub system: Option<String>,
    /// 同一对话中之前的轮次，按时间顺序
    #[serde(default)]
    pub history: Vec<Exchange>,
    /// 所属对话，未指定时记录日志前会生成新的对话 ID
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl Prompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_history(mut self, history: Vec<Exchange>) -> Self {
        self.history = history;
        self
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

/// 模型原始输出
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// 一段文本
    Text(String),
    /// 结构化元数据，通常在最后出现
    Details {
        response_json: serde_json::Value,
        usage: Option<Usage>,
    },
}

/// 模型原始输出迭代器（阻塞）
pub type ModelOutputs = Box<dyn Iterator<Item = Result<ModelOutput, ModelError>> + Send>;

/// 模型接口
pub trait Model: Send + Sync {
    /// 模型 ID
    fn model_id(&self) -> &str;

    /// 展示名称
    fn display_name(&self) -> String {
        self.model_id().to_string()
    }

    /// 能力标记
    fn capabilities(&self) -> ModelCapabilities;

    /// 发起调用（阻塞）
    fn execute(&self, prompt: &Prompt) -> Result<ModelOutputs, ModelError>;
}
