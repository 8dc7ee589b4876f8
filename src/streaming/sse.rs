//! SSE 帧编码
//!
//! `/-/llm/stream` 的响应体：每段文本一帧 `data: {"text": ...}`，
//! 以 `data: {"done": true}` 结束。

use super::bridge::{BridgeItem, BridgeStream};
use crate::providers::PromptEvent;
use futures::{Stream, StreamExt};

/// 编码一个 data 帧
pub fn data_frame(payload: &serde_json::Value) -> String {
    format!("data: {}\n\n", payload)
}

pub fn text_frame(text: &str) -> String {
    data_frame(&serde_json::json!({ "text": text }))
}

pub fn error_frame(message: &str) -> String {
    data_frame(&serde_json::json!({ "error": message }))
}

pub fn done_frame() -> String {
    data_frame(&serde_json::json!({ "done": true }))
}

/// 把桥接输出转换为 SSE 帧流
///
/// 结束标记不单独成帧；错误帧之后仍以 done 帧收尾。
pub fn prompt_event_frames(
    events: BridgeStream<PromptEvent>,
) -> impl Stream<Item = String> + Send + 'static {
    async_stream::stream! {
        let mut events = events;
        while let Some(item) = events.next().await {
            match item {
                BridgeItem::Item(PromptEvent::Chunk(text)) => yield text_frame(&text),
                BridgeItem::Item(PromptEvent::Done(response)) => {
                    tracing::debug!(
                        "[STREAM] 响应完成: model={} duration_ms={}",
                        response.model_id,
                        response.duration_ms
                    );
                }
                BridgeItem::Error(message) => {
                    tracing::warn!("[STREAM] 模型调用失败: {}", message);
                    yield error_frame(&message);
                }
            }
        }
        yield done_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{EchoModel, Prompt};
    use crate::streaming::bridge::stream_prompt;
    use std::sync::Arc;

    #[test]
    fn test_frames() {
        assert_eq!(text_frame("hi \"x\""), "data: {\"text\":\"hi \\\"x\\\"\"}\n\n");
        assert_eq!(done_frame(), "data: {\"done\":true}\n\n");
        assert_eq!(error_frame("boom"), "data: {\"error\":\"boom\"}\n\n");
    }

    #[tokio::test]
    async fn test_prompt_event_frames() {
        let events = stream_prompt(Arc::new(EchoModel), Prompt::new("a b")).unwrap();
        let frames: Vec<String> = prompt_event_frames(events).collect().await;
        assert_eq!(
            frames,
            vec![text_frame("a "), text_frame("b"), done_frame()]
        );
    }
}
