//! 内置 echo 模型
//!
//! 不需要密钥，把提示词按词逐段返回。用于本地试用和测试。

use super::traits::{Model, ModelCapabilities, ModelOutput, ModelOutputs, Prompt, Usage};
use super::ModelError;

pub struct EchoModel;

impl EchoModel {
    pub const MODEL_ID: &'static str = "echo";
}

impl Model for EchoModel {
    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }

    fn display_name(&self) -> String {
        "Echo: returns the prompt".to_string()
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            can_stream: true,
            needs_key: false,
        }
    }

    fn execute(&self, prompt: &Prompt) -> Result<ModelOutputs, ModelError> {
        let words: Vec<String> = prompt
            .prompt
            .split_inclusive(char::is_whitespace)
            .map(str::to_string)
            .collect();
        let count = words.len() as i64;
        let details = ModelOutput::Details {
            response_json: serde_json::json!({
                "model": Self::MODEL_ID,
                "history_length": prompt.history.len(),
                "has_system": prompt.system.is_some(),
            }),
            usage: Some(Usage {
                input_tokens: Some(count),
                output_tokens: Some(count),
            }),
        };
        Ok(Box::new(
            words
                .into_iter()
                .map(|w| Ok(ModelOutput::Text(w)))
                .chain(std::iter::once(Ok(details))),
        ))
    }
}
