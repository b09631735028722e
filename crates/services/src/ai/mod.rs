//! Language-model collaborators.
//!
//! The chat store and quiz producer only see the traits here; `AiClient` is
//! the OpenAI-compatible implementation used by the app.

mod client;
mod prompts;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use study_core::model::SessionId;

use crate::error::AiError;

pub use client::AiClient;

/// Incremental reply text, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, AiError>>;

/// Produces the assistant side of a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Full reply to one user message.
    ///
    /// Only the newest user text is passed. Implementations that want earlier
    /// turns key their own context on `session_id`.
    async fn reply(&self, session_id: SessionId, text: &str) -> Result<String, AiError>;

    /// Reply as a sequence of chunks. Defaults to the full reply as one chunk.
    async fn reply_stream(&self, session_id: SessionId, text: &str) -> Result<TextStream, AiError> {
        let reply = self.reply(session_id, text).await?;
        Ok(stream::once(async move { Ok(reply) }).boxed())
    }
}

/// Names a session from its first message.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate_title(&self, session_id: SessionId, seed: &str) -> Result<String, AiError>;
}
