use async_trait::async_trait;
use study_core::model::{MessageId, SessionId};

use super::SqliteRepository;
use super::mapping::{conn_err, map_message_row, session_id_to_i64, write_err};
use crate::repository::{MessageRecord, MessageRepository, NewMessageRecord, StorageError};

#[async_trait]
impl MessageRepository for SqliteRepository {
    async fn create_message(
        &self,
        message: NewMessageRecord,
    ) -> Result<MessageRecord, StorageError> {
        sqlx::query(
            r"
                INSERT INTO chat_messages (id, session_id, role, text, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(message.id.to_string())
        .bind(session_id_to_i64(message.session_id)?)
        .bind(message.role.as_str())
        .bind(message.text.clone())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(MessageRecord {
            id: message.id,
            session_id: message.session_id,
            role: message.role,
            text: message.text,
            created_at: message.created_at,
        })
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, session_id, role, text, created_at
                FROM chat_messages
                WHERE session_id = ?1
                ORDER BY seq ASC
            ",
        )
        .bind(session_id_to_i64(session_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_message_row).collect()
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM chat_messages WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;
        Ok(())
    }
}
