//! datasette-llm
//!
//! 在浏览器中与大语言模型对话，对话记录保存在 llm 的 SQLite 日志数据库中。
//!
//! - `providers`: 模型网关（模型 trait、注册表、日志写入）
//! - `database`: 日志数据库句柄和数据访问
//! - `streaming`: 阻塞模型调用到异步流的桥接
//! - `websocket`: 对话通道
//! - `server`: 页面、JSON 和 SSE 接口

pub mod cli;
pub mod config;
pub mod database;
pub mod models;
pub mod providers;
pub mod server;
pub mod streaming;
pub mod telemetry;
pub mod templates;
pub mod websocket;

pub use config::Config;
pub use database::LogDatabase;
pub use providers::{Model, ModelRegistry};
pub use server::{build_router, AppState};
