//! 表结构
//!
//! `initiated` 属于本插件；`conversations` / `responses` 与 llm 日志数据库保持一致，
//! 只在模型日志写入路径上创建。

use rusqlite::Connection;

const INITIATED_TABLE: &str = "
CREATE TABLE IF NOT EXISTS initiated (
    id TEXT PRIMARY KEY,
    model_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    system TEXT,
    actor_id TEXT,
    datetime_utc TEXT NOT NULL
)";

const LOG_TABLES: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    name TEXT,
    model TEXT
);
CREATE TABLE IF NOT EXISTS responses (
    id TEXT PRIMARY KEY,
    model TEXT,
    prompt TEXT,
    system TEXT,
    prompt_json TEXT,
    options_json TEXT,
    response TEXT,
    response_json TEXT,
    conversation_id TEXT REFERENCES conversations(id),
    duration_ms INTEGER,
    datetime_utc TEXT,
    input_tokens INTEGER,
    output_tokens INTEGER
);
CREATE INDEX IF NOT EXISTS idx_responses_conversation_id ON responses(conversation_id);
";

/// 创建 `initiated` 表
pub fn ensure_initiated_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(INITIATED_TABLE, [])?;
    Ok(())
}

/// 创建日志表
pub fn ensure_log_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(LOG_TABLES)
}

/// 判断错误是否为“表尚不存在”
///
/// 日志表由模型第一次写日志时创建，在那之前读取到的是空状态而不是错误。
pub fn is_missing_table(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.starts_with("no such table"),
        _ => false,
    }
}

/// 把“表不存在”转换为默认值
pub trait MissingTableExt<T> {
    fn or_empty(self) -> Result<T, rusqlite::Error>;
}

impl<T: Default> MissingTableExt<T> for Result<T, rusqlite::Error> {
    fn or_empty(self) -> Result<T, rusqlite::Error> {
        match self {
            Err(e) if is_missing_table(&e) => Ok(T::default()),
            other => other,
        }
    }
}
