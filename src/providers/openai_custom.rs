//! OpenAI 兼容 Chat Completions 模型
//!
//! 使用阻塞的 reqwest 客户端发起 SSE 流式请求，逐行解析 `data:` 事件。
//! 客户端在每次调用时于工作线程上创建，不在异步上下文中创建或释放。

use super::traits::{Model, ModelCapabilities, ModelOutput, ModelOutputs, Prompt, Usage};
use super::ModelError;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;

/// 密钥环境变量
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIChatModel {
    model_id: String,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl OpenAIChatModel {
    pub fn new(model_id: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url,
        }
    }

    /// 构建完整的 API URL，base_url 带不带 `/v1` 都可以
    fn build_url(&self, endpoint: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base = base.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, endpoint)
        } else {
            format!("{}/v1/{}", base, endpoint)
        }
    }

    /// 构建请求体
    fn build_request(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &prompt.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for exchange in &prompt.history {
            messages.push(serde_json::json!({"role": "user", "content": exchange.prompt}));
            messages.push(serde_json::json!({"role": "assistant", "content": exchange.response}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt.prompt}));

        serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        })
    }
}

impl Model for OpenAIChatModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn display_name(&self) -> String {
        format!("OpenAI Chat: {}", self.model_id)
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            can_stream: true,
            needs_key: true,
        }
    }

    fn execute(&self, prompt: &Prompt) -> Result<ModelOutputs, ModelError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| ModelError::MissingKey {
            model_id: self.model_id.clone(),
            env: OPENAI_KEY_ENV.to_string(),
        })?;

        let url = self.build_url("chat/completions");
        tracing::info!("[OPENAI_STREAM] 发起流式请求: url={} model={}", url, self.model_id);

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Option::<Duration>::None)
            .build()
            .map_err(|e| ModelError::from_reqwest_error(&e))?;

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&self.build_request(prompt))
            .send()
            .map_err(|e| ModelError::from_reqwest_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            tracing::error!("[OPENAI_STREAM] 请求失败: {} - {}", status, body);
            return Err(ModelError::from_http_status(status.as_u16(), &body));
        }

        Ok(Box::new(SseOutputs::new(BufReader::new(resp))))
    }
}

/// SSE 流中的一个 chunk
#[derive(Debug, Deserialize)]
struct ChatChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
}

/// 把 SSE 行流转换为模型输出
struct SseOutputs<R: BufRead> {
    lines: Lines<R>,
    id: Option<String>,
    model: Option<String>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    finished: bool,
}

impl<R: BufRead> SseOutputs<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            id: None,
            model: None,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    fn details(&mut self) -> ModelOutput {
        ModelOutput::Details {
            response_json: serde_json::json!({
                "id": self.id,
                "model": self.model,
                "finish_reason": self.finish_reason,
            }),
            usage: self.usage.take(),
        }
    }

    /// 处理一个 data 负载，返回其中的文本
    fn absorb(&mut self, data: &str) -> Result<Option<String>, ModelError> {
        let chunk: ChatChunk = serde_json::from_str(data)?;
        if chunk.id.is_some() {
            self.id = chunk.id;
        }
        if chunk.model.is_some() {
            self.model = chunk.model;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }
        let mut text: Option<String> = None;
        for choice in chunk.choices {
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
            if let Some(content) = choice.delta.content {
                text.get_or_insert_with(String::new).push_str(&content);
            }
        }
        Ok(text)
    }
}

impl<R: BufRead + Send> Iterator for SseOutputs<R> {
    type Item = Result<ModelOutput, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    return Some(Ok(self.details()));
                }
            };

            let data = match line.trim().strip_prefix("data:") {
                Some(data) => data.trim(),
                None => continue,
            };
            if data == "[DONE]" {
                self.finished = true;
                return Some(Ok(self.details()));
            }
            match self.absorb(data) {
                Ok(Some(text)) => return Some(Ok(ModelOutput::Text(text))),
                Ok(None) => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::Exchange;

    #[test]
    fn test_build_url() {
        let with_v1 = OpenAIChatModel::new("m", None, Some("http://localhost:8080/v1/".into()));
        assert_eq!(
            with_v1.build_url("chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        let default = OpenAIChatModel::new("m", None, None);
        assert_eq!(
            default.build_url("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_includes_history() {
        let model = OpenAIChatModel::new("gpt-4o-mini", None, None);
        let prompt = Prompt::new("and now?")
            .with_system(Some("be brief".into()))
            .with_history(vec![Exchange {
                prompt: "hi".into(),
                response: "hello".into(),
            }]);
        let body = model.build_request(&prompt);
        let roles: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_missing_key() {
        let model = OpenAIChatModel::new("gpt-4o", None, None);
        assert!(matches!(
            model.execute(&Prompt::new("hi")),
            Err(ModelError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_parse_sse_stream() {
        let body = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        );
        let outputs: Vec<_> = SseOutputs::new(body.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0], ModelOutput::Text("Hel".into()));
        assert_eq!(outputs[1], ModelOutput::Text("lo".into()));
        match &outputs[2] {
            ModelOutput::Details {
                response_json,
                usage,
            } => {
                assert_eq!(response_json["finish_reason"], "stop");
                assert_eq!(response_json["model"], "gpt-4o-mini");
                assert_eq!(usage.unwrap().input_tokens, Some(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let mut outputs = SseOutputs::new("data: {not json}\n\n".as_bytes());
        assert!(matches!(outputs.next(), Some(Err(ModelError::ParseError(_)))));
        assert!(outputs.next().is_none());
    }
}
