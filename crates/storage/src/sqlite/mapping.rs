use sqlx::Row;
use study_core::model::{MessageId, Role, Session, SessionId};

use crate::repository::{MessageRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps write failures, keeping constraint violations distinguishable.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    u64::try_from(v)
        .map(SessionId::new)
        .map_err(|_| StorageError::Serialization("session_id sign overflow".into()))
}

pub(crate) fn session_id_to_i64(id: SessionId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("session_id overflow".into()))
}

pub(crate) fn parse_role(s: &str) -> Result<Role, StorageError> {
    Role::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid role: {s}")))
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    Ok(Session::new(
        session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<Option<String>, _>("topic").map_err(ser)?,
        row.try_get("started_at").map_err(ser)?,
    ))
}

pub(crate) fn map_message_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<MessageRecord, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let role: String = row.try_get("role").map_err(ser)?;

    Ok(MessageRecord {
        id: id.parse::<MessageId>().map_err(ser)?,
        session_id: session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(ser)?)?,
        role: parse_role(&role)?,
        text: row.try_get("text").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
