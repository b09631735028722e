use std::env;
use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::ai::AiClient;
use crate::app_settings_service::AppSettingsService;
use crate::chat::SessionMessageStore;
use crate::config::{AiConfig, QuizStreamConfig};
use crate::error::AppServicesError;
use crate::quiz::{HttpQuizExchange, LocalQuizExchange, QuizExchange, QuizProducer, QuizStreamClient};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    ai: Arc<AiClient>,
    messages: Arc<SessionMessageStore>,
    quiz: Arc<QuizStreamClient>,
    app_settings: Arc<AppSettingsService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, configured from saved
    /// settings and the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or settings loading fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock, |key| env::var(key).ok()).await
    }

    /// Build services over `storage`, resolving configuration from its saved
    /// settings first and `lookup` second.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if settings cannot be loaded.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppServicesError> {
        let app_settings = AppSettingsService::new(Arc::clone(&storage.app_settings));
        let (ai_config, quiz_config) = app_settings.resolve(lookup).await?;
        Ok(Self::new(storage, clock, ai_config, quiz_config))
    }

    /// In-memory storage with explicit configuration.
    #[must_use]
    pub fn in_memory(clock: Clock, ai_config: Option<AiConfig>, quiz_config: Option<QuizStreamConfig>) -> Self {
        Self::new(Storage::in_memory(), clock, ai_config, quiz_config)
    }

    /// Wire services together. Without a quiz stream endpoint, quizzes are
    /// generated in-process by a `QuizProducer` over the AI client.
    #[must_use]
    pub fn new(
        storage: Storage,
        clock: Clock,
        ai_config: Option<AiConfig>,
        quiz_config: Option<QuizStreamConfig>,
    ) -> Self {
        let ai = Arc::new(AiClient::new(ai_config));
        if !ai.enabled() {
            tracing::warn!("no AI API key configured; chat replies and quiz generation will fail");
        }

        let messages = Arc::new(SessionMessageStore::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.messages),
            ai.clone(),
            ai.clone(),
        ));

        let exchange: Arc<dyn QuizExchange> = match quiz_config {
            Some(config) => {
                tracing::debug!(endpoint = %config.endpoint, "using remote quiz stream");
                Arc::new(HttpQuizExchange::new(config))
            }
            None => Arc::new(LocalQuizExchange::new(QuizProducer::new(ai.clone()))),
        };
        let quiz = Arc::new(QuizStreamClient::new(exchange));
        let app_settings = Arc::new(AppSettingsService::new(Arc::clone(&storage.app_settings)));

        Self {
            storage,
            ai,
            messages,
            quiz,
            app_settings,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn ai(&self) -> Arc<AiClient> {
        Arc::clone(&self.ai)
    }

    #[must_use]
    pub fn messages(&self) -> Arc<SessionMessageStore> {
        Arc::clone(&self.messages)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizStreamClient> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn app_settings(&self) -> Arc<AppSettingsService> {
        Arc::clone(&self.app_settings)
    }
}
