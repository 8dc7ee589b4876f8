//! 请求处理器
//!
//! - `pages`: HTML 页面和对话创建
//! - `api`: JSON 和 SSE 接口

pub mod api;
pub mod pages;

pub use api::{chat, sessions, stream_get, stream_post};
pub use pages::{conversation, index, start, start_redirect};

use once_cell::sync::Lazy;
use regex::Regex;

static CONVERSATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-z]+$").expect("conversation id pattern"));

/// 对话 ID 只允许小写字母和数字
pub fn is_valid_conversation_id(id: &str) -> bool {
    CONVERSATION_ID.is_match(id)
}
