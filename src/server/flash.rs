//! 一次性页面消息
//!
//! 重定向前把消息写入 `ds_messages` cookie，下一个页面读取并清除。

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

pub const COOKIE_NAME: &str = "ds_messages";

/// 其他页面也可能写入 info/warning 消息，这里都能读出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub message: String,
    pub level: MessageLevel,
}

impl FlashMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: MessageLevel::Error,
        }
    }
}

/// 设置消息的 Set-Cookie 头
pub fn set_cookie(messages: &[FlashMessage]) -> Option<HeaderValue> {
    let json = serde_json::to_string(messages).ok()?;
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        COOKIE_NAME,
        urlencoding::encode(&json)
    ))
    .ok()
}

/// 清除消息的 Set-Cookie 头
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("ds_messages=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// 从请求 cookie 中读取消息，无法解析时忽略
pub fn read(headers: &HeaderMap) -> Vec<FlashMessage> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == COOKIE_NAME).then_some(value)
        })
        .filter_map(|value| urlencoding::decode(value).ok())
        .filter_map(|json| serde_json::from_str::<Vec<FlashMessage>>(&json).ok())
        .flatten()
        .collect()
}
