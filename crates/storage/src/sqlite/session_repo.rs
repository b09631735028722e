use async_trait::async_trait;
use study_core::model::{Session, SessionId};

use super::SqliteRepository;
use super::mapping::{conn_err, map_session_row, session_id_from_i64, session_id_to_i64};
use crate::repository::{NewSessionRecord, SessionRepository, StorageError};

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: NewSessionRecord) -> Result<SessionId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO chat_sessions (topic, started_at)
                VALUES (?1, ?2)
            ",
        )
        .bind(session.topic)
        .bind(session.started_at)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        session_id_from_i64(res.last_insert_rowid())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, topic, started_at
                FROM chat_sessions
                WHERE id = ?1
            ",
        )
        .bind(session_id_to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, topic, started_at
                FROM chat_sessions
                ORDER BY started_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_session_row).collect()
    }

    async fn update_topic(&self, id: SessionId, topic: &str) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE chat_sessions SET topic = ?1 WHERE id = ?2")
            .bind(topic.trim())
            .bind(session_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
