//! SQLite message log implementation.
//!
//! Implements `MessageLog` from `peerchat-core` using sqlx with split
//! read/write pools. Each message is one row keyed by its id; the body is the
//! message serialized as JSON, so new message fields need no migration.

use chrono::Utc;
use peerchat_core::chat::MessageLog;
use peerchat_types::error::RepositoryError;
use peerchat_types::message::Message;
use peerchat_types::persona::PersonaId;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageLog`.
#[derive(Clone)]
pub struct SqliteMessageLog {
    pool: DatabasePool,
}

impl SqliteMessageLog {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for SqliteMessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMessageLog").finish_non_exhaustive()
    }
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

impl MessageLog for SqliteMessageLog {
    async fn record(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
        message: &Message,
    ) -> Result<(), RepositoryError> {
        let body = serde_json::to_string(message)
            .map_err(|e| RepositoryError::Query(format!("serialize message: {e}")))?;
        let now = Utc::now().to_rfc3339();

        // The conflict branch only fires for the same conversation, so a
        // message id reused across conversations affects no rows.
        let result = sqlx::query(
            r#"INSERT INTO message_log
               (message_id, owner_id, persona_id, sender, body, recorded_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(message_id) DO UPDATE SET
                   body = excluded.body,
                   updated_at = excluded.updated_at
               WHERE message_log.owner_id = excluded.owner_id
                 AND message_log.persona_id = excluded.persona_id"#,
        )
        .bind(message.id.to_string())
        .bind(owner_id)
        .bind(persona_id.as_str())
        .bind(message.sender.to_string())
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "message {} belongs to another conversation",
                message.id
            )));
        }
        Ok(())
    }

    async fn clear_conversation(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM message_log WHERE owner_id = ? AND persona_id = ?")
            .bind(owner_id)
            .bind(persona_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        tracing::debug!(
            owner_id,
            persona_id = %persona_id,
            removed = result.rows_affected(),
            "cleared conversation from message log"
        );
        Ok(())
    }

    async fn replay(&self, owner_id: &str) -> Result<Vec<(PersonaId, Message)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT persona_id, body FROM message_log WHERE owner_id = ? ORDER BY seq ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let persona_id: String = row.try_get("persona_id").map_err(query_error)?;
            let body: String = row.try_get("body").map_err(query_error)?;
            let message: Message = serde_json::from_str(&body)
                .map_err(|e| RepositoryError::Query(format!("invalid message body JSON: {e}")))?;
            entries.push((PersonaId::from(persona_id), message));
        }
        Ok(entries)
    }
}
