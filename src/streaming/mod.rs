//! 流式传输模块
//!
//! - `bridge`: 把阻塞的模型调用桥接为异步流
//! - `sse`: `/-/llm/stream` 使用的 SSE 帧编码

pub mod bridge;
pub mod sse;

pub use bridge::{bridge, stream_prompt, BridgeError, BridgeItem, BridgeStream};
pub use sse::{data_frame, done_frame, error_frame, prompt_event_frames, text_frame};
