//! 模型网关
//!
//! - `traits`: `Model` trait 和调用输入
//! - `registry`: 按 ID 解析模型
//! - `response`: 响应事件、完整响应以及日志写入
//! - `echo` / `openai_custom`: 内置模型实现

pub mod echo;
pub mod error;
pub mod openai_custom;
pub mod registry;
pub mod response;
pub mod traits;

pub use echo::EchoModel;
pub use error::ModelError;
pub use openai_custom::OpenAIChatModel;
pub use registry::{ModelInfo, ModelRegistry};
pub use response::{
    conversation_name, new_conversation_id, prompt, CompletedResponse, PromptEvent, PromptEvents,
};
pub use traits::{
    Exchange, Model, ModelCapabilities, ModelOutput, ModelOutputs, Prompt, Usage,
};
