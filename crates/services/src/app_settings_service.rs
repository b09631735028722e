use std::sync::Arc;

use storage::repository::AppSettingsRepository;
use study_core::model::{AppSettings, AppSettingsDraft};

use crate::config::{AiConfig, QuizStreamConfig};
use crate::error::AppSettingsServiceError;

/// Loads and saves the user's AI connection settings.
#[derive(Clone)]
pub struct AppSettingsService {
    repo: Arc<dyn AppSettingsRepository>,
}

impl AppSettingsService {
    #[must_use]
    pub fn new(repo: Arc<dyn AppSettingsRepository>) -> Self {
        Self { repo }
    }

    /// Load persisted settings (or defaults if missing).
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsServiceError` on storage failures.
    pub async fn load(&self) -> Result<AppSettings, AppSettingsServiceError> {
        let settings = self.repo.get_settings().await?;
        Ok(settings.unwrap_or_default())
    }

    /// Validate and persist new settings.
    ///
    /// Saved values take effect the next time app services are assembled.
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsServiceError` if validation fails or persistence fails.
    pub async fn save(
        &self,
        draft: AppSettingsDraft,
    ) -> Result<AppSettings, AppSettingsServiceError> {
        let settings = draft.validate()?;
        self.repo.save_settings(&settings).await?;
        tracing::debug!(ai_configured = settings.api_key().is_some(), "saved app settings");
        Ok(settings)
    }

    /// Resolve AI and quiz stream configuration from saved settings, falling
    /// back to `lookup` for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsServiceError` on storage failures.
    pub async fn resolve(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Option<AiConfig>, Option<QuizStreamConfig>), AppSettingsServiceError> {
        let settings = self.load().await?;
        Ok((
            AiConfig::resolve(&settings, &lookup),
            QuizStreamConfig::resolve(&settings, &lookup),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;

    fn service() -> AppSettingsService {
        AppSettingsService::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn missing_settings_load_as_defaults() {
        assert_eq!(service().load().await.unwrap(), AppSettings::default());
    }

    #[tokio::test]
    async fn save_validates_before_persisting() {
        let service = service();
        let bad = AppSettingsDraft {
            api_base_url: Some("not a url".into()),
            ..AppSettingsDraft::default()
        };
        assert!(matches!(
            service.save(bad).await,
            Err(AppSettingsServiceError::Settings(_))
        ));

        let good = AppSettingsDraft {
            api_key: Some(" sk-saved ".into()),
            ..AppSettingsDraft::default()
        };
        service.save(good).await.unwrap();
        assert_eq!(service.load().await.unwrap().api_key(), Some("sk-saved"));
    }

    #[tokio::test]
    async fn resolve_prefers_saved_key() {
        let service = service();
        service
            .save(AppSettingsDraft {
                api_key: Some("sk-saved".into()),
                ..AppSettingsDraft::default()
            })
            .await
            .unwrap();

        let (ai, quiz) = service
            .resolve(|key| (key == crate::config::ENV_API_KEY).then(|| "sk-env".to_string()))
            .await
            .unwrap();
        assert_eq!(ai.unwrap().api_key, "sk-saved");
        assert_eq!(quiz, None);
    }
}
