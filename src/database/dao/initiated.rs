//! 待开始对话数据访问对象

use crate::database::schema::{ensure_initiated_table, MissingTableExt};
use crate::models::PendingStart;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub struct InitiatedDao;

impl InitiatedDao {
    /// 插入待开始记录，表不存在时先建表
    pub fn insert(conn: &Connection, pending: &PendingStart) -> Result<(), rusqlite::Error> {
        ensure_initiated_table(conn)?;
        conn.execute(
            "INSERT INTO initiated (id, model_id, prompt, system, actor_id, datetime_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pending.conversation_id,
                pending.model_id,
                pending.prompt,
                pending.system_prompt,
                pending.requester_id,
                pending.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按对话 ID 获取待开始记录
    pub fn get(
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<Option<PendingStart>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, model_id, prompt, system, actor_id, datetime_utc
             FROM initiated WHERE id = ?1",
            [conversation_id],
            Self::row_to_pending,
        )
        .optional()
        .or_empty()
    }

    fn row_to_pending(row: &Row) -> Result<PendingStart, rusqlite::Error> {
        let datetime: String = row.get(5)?;
        let created_at = DateTime::parse_from_rfc3339(&datetime)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(PendingStart {
            conversation_id: row.get(0)?,
            model_id: row.get(1)?,
            prompt: row.get(2)?,
            system_prompt: row.get(3)?,
            requester_id: row.get(4)?,
            created_at,
        })
    }
}
