//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::{AppSettingsError, SessionId};

/// Errors emitted by the AI client and the collaborator traits it implements.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiError {
    #[error("AI is not configured")]
    Disabled,
    #[error("AI returned an empty response")]
    EmptyResponse,
    #[error("AI request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("AI reply could not be parsed: {0}")]
    InvalidReply(String),
    #[error("AI call failed: {0}")]
    Failed(String),
}

/// Terminal failures of a streamed quiz generation.
///
/// Malformed records never surface here; they are skipped while decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizStreamError {
    #[error("quiz topic cannot be empty")]
    EmptyTopic,
    #[error("quiz stream request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("quiz stream response has no body")]
    NoBody,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("quiz stream interrupted: {0}")]
    Transport(String),
    #[error("quiz generation failed: {0}")]
    Generator(String),
    #[error("no questions generated")]
    NoQuestions,
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Errors emitted by `SessionMessageStore` operations that touch storage
/// directly (opening and creating sessions).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MessageStoreError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AppSettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppSettingsServiceError {
    #[error(transparent)]
    Settings(#[from] AppSettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Settings(#[from] AppSettingsServiceError),
}
