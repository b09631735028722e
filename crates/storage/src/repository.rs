use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_core::model::{AppSettings, Message, MessageId, Role, Session, SessionId};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Insert shape for a chat session.
#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub topic: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Insert shape for a transcript message.
///
/// The id is chosen by the caller so the persisted row matches the message
/// already shown in the client.
#[derive(Debug, Clone)]
pub struct NewMessageRecord {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessageRecord {
    #[must_use]
    pub fn from_message(
        session_id: SessionId,
        message: &Message,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: message.id(),
            session_id,
            role: message.role(),
            text: message.text().to_owned(),
            created_at,
        }
    }
}

/// Persisted shape for a transcript message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Stored messages are always complete, never loading.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::new(self.id, self.role, self.text)
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn create_session(&self, session: NewSessionRecord) -> Result<SessionId, StorageError>;

    /// Fetch a session by id, `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// List sessions, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError>;

    /// Replace the topic of an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn update_topic(&self, id: SessionId, topic: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message to a session transcript.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing and
    /// `StorageError::Conflict` if the message id is already stored.
    async fn create_message(&self, message: NewMessageRecord)
    -> Result<MessageRecord, StorageError>;

    /// List a session's messages in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_messages(&self, session_id: SessionId)
    -> Result<Vec<MessageRecord>, StorageError>;

    /// Remove a stored message. Deleting an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_message(&self, id: MessageId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AppSettingsRepository: Send + Sync {
    /// Load saved settings, `Ok(None)` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or validation failures.
    async fn get_settings(&self) -> Result<Option<AppSettings>, StorageError>;

    /// Replace the saved settings.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the settings cannot be stored.
    async fn save_settings(&self, settings: &AppSettings) -> Result<(), StorageError>;
}

#[derive(Default)]
struct InMemoryState {
    next_session_id: u64,
    sessions: HashMap<SessionId, Session>,
    messages: Vec<MessageRecord>,
    settings: Option<AppSettings>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: NewSessionRecord) -> Result<SessionId, StorageError> {
        let mut guard = self.lock()?;
        guard.next_session_id += 1;
        let id = SessionId::new(guard.next_session_id);
        guard
            .sessions
            .insert(id, Session::new(id, session.topic, session.started_at));
        Ok(id)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        let mut sessions: Vec<Session> = guard.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.started_at()
                .cmp(&a.started_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        sessions.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(sessions)
    }

    async fn update_topic(&self, id: SessionId, topic: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let session = guard.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.set_topic(topic);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn create_message(
        &self,
        message: NewMessageRecord,
    ) -> Result<MessageRecord, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sessions.contains_key(&message.session_id) {
            return Err(StorageError::NotFound);
        }
        if guard.messages.iter().any(|m| m.id == message.id) {
            return Err(StorageError::Conflict);
        }
        let record = MessageRecord {
            id: message.id,
            session_id: message.session_id,
            role: message.role,
            text: message.text,
            created_at: message.created_at,
        };
        guard.messages.push(record.clone());
        Ok(record)
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.messages.retain(|m| m.id != id);
        Ok(())
    }
}

#[async_trait]
impl AppSettingsRepository for InMemoryRepository {
    async fn get_settings(&self) -> Result<Option<AppSettings>, StorageError> {
        Ok(self.lock()?.settings.clone())
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), StorageError> {
        self.lock()?.settings = Some(settings.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub app_settings: Arc<dyn AppSettingsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            sessions: Arc::new(repo.clone()),
            messages: Arc::new(repo.clone()),
            app_settings: Arc::new(repo),
        }
    }
}
