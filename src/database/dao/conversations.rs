//! 对话与响应数据访问对象（只读）
//!
//! 写入只发生在 `CompletedResponse::log_to_db` 中。

use crate::database::schema::MissingTableExt;
use crate::models::{Conversation, ConversationSummary, ResponseRecord};
use rusqlite::{Connection, OptionalExtension, Row};

const RESPONSE_COLUMNS: &str = "id, conversation_id, model, prompt, system, response,
     datetime_utc, duration_ms, response_json";

pub struct ConversationDao;

impl ConversationDao {
    /// 获取对话
    pub fn get(conn: &Connection, id: &str) -> Result<Option<Conversation>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, name, model FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    model_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            },
        )
        .optional()
        .or_empty()
    }

    /// 获取对话的全部响应，按写入顺序
    pub fn responses(
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<Vec<ResponseRecord>, rusqlite::Error> {
        Self::query_responses(
            conn,
            &format!(
                "SELECT {RESPONSE_COLUMNS} FROM responses
                 WHERE conversation_id = ?1 ORDER BY rowid ASC"
            ),
            rusqlite::params![conversation_id],
        )
        .or_empty()
    }

    /// 统计对话的响应数
    pub fn count_responses(conn: &Connection, conversation_id: &str) -> Result<i64, rusqlite::Error> {
        conn.query_row(
            "SELECT count(*) FROM responses WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )
        .or_empty()
    }

    /// 首页对话列表，最近活跃的在前
    pub fn list_summaries(
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, rusqlite::Error> {
        let run = || -> Result<Vec<ConversationSummary>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.model, MIN(r.datetime_utc), COUNT(r.id)
                 FROM conversations c
                 LEFT JOIN responses r ON r.conversation_id = c.id
                 GROUP BY c.id
                 ORDER BY MAX(r.rowid) DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], |row| {
                Ok(ConversationSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    model_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    first_response_at: row.get(3)?,
                    response_count: row.get(4)?,
                })
            })?;
            rows.collect()
        };
        run().or_empty()
    }

    /// 最近的响应，最新的在前
    pub fn recent_responses(
        conn: &Connection,
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, rusqlite::Error> {
        Self::query_responses(
            conn,
            &format!("SELECT {RESPONSE_COLUMNS} FROM responses ORDER BY rowid DESC LIMIT ?1"),
            rusqlite::params![limit as i64],
        )
        .or_empty()
    }

    fn query_responses(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ResponseRecord>, rusqlite::Error> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_response)?;
        rows.collect()
    }

    fn row_to_response(row: &Row) -> Result<ResponseRecord, rusqlite::Error> {
        let response_json: Option<String> = row.get(8)?;
        Ok(ResponseRecord {
            id: row.get(0)?,
            conversation_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            model_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            prompt: row.get(3)?,
            system: row.get(4)?,
            response: row.get(5)?,
            datetime_utc: row.get(6)?,
            duration_ms: row.get(7)?,
            response_json: response_json.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::ensure_log_tables;

    fn seed(conn: &Connection) {
        ensure_log_tables(conn).unwrap();
        conn.execute_batch(
            "INSERT INTO conversations VALUES ('c1', 'first chat', 'echo');
             INSERT INTO conversations VALUES ('c2', NULL, 'gpt-4o-mini');
             INSERT INTO responses (id, model, prompt, response, conversation_id, datetime_utc, response_json)
               VALUES ('r1', 'echo', 'hi', 'hi', 'c1', '2024-01-01T00:00:00', '{\"a\": 1}');
             INSERT INTO responses (id, model, prompt, response, conversation_id, datetime_utc)
               VALUES ('r2', 'echo', 'again', 'again', 'c1', '2024-01-01T00:01:00');
             INSERT INTO responses (id, model, prompt, response, conversation_id, datetime_utc)
               VALUES ('r3', 'gpt-4o-mini', 'yo', 'hey', 'c2', '2024-01-02T00:00:00');",
        )
        .unwrap();
    }

    #[test]
    fn test_reads_on_fresh_database_are_empty() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(ConversationDao::get(&conn, "c1").unwrap().is_none());
        assert!(ConversationDao::responses(&conn, "c1").unwrap().is_empty());
        assert_eq!(ConversationDao::count_responses(&conn, "c1").unwrap(), 0);
        assert!(ConversationDao::list_summaries(&conn, 10).unwrap().is_empty());
        assert!(ConversationDao::recent_responses(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn test_responses_in_insertion_order() {
        let conn = Connection::open_in_memory().unwrap();
        seed(&conn);
        let responses = ConversationDao::responses(&conn, "c1").unwrap();
        let ids: Vec<_> = responses.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(responses[0].response_json, Some(serde_json::json!({"a": 1})));
        assert_eq!(ConversationDao::count_responses(&conn, "c1").unwrap(), 2);
    }

    #[test]
    fn test_list_summaries() {
        let conn = Connection::open_in_memory().unwrap();
        seed(&conn);
        let summaries = ConversationDao::list_summaries(&conn, 10).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "c2");
        assert_eq!(summaries[1].id, "c1");
        assert_eq!(summaries[1].response_count, 2);
        assert_eq!(
            summaries[1].first_response_at.as_deref(),
            Some("2024-01-01T00:00:00")
        );
        assert_eq!(ConversationDao::list_summaries(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_get_conversation() {
        let conn = Connection::open_in_memory().unwrap();
        seed(&conn);
        let c = ConversationDao::get(&conn, "c1").unwrap().unwrap();
        assert_eq!(c.name.as_deref(), Some("first chat"));
        assert_eq!(c.model_id, "echo");
    }
}
