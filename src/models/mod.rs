//! 数据模型

pub mod conversation_model;

pub use conversation_model::{
    parse_datetime_utc, Conversation, ConversationSummary, PendingStart, ResponseRecord,
    Transcript, UNTITLED_CONVERSATION,
};
