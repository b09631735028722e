use std::env;

use study_core::model::AppSettings;

pub const ENV_API_KEY: &str = "STUDY_AI_API_KEY";
pub const ENV_BASE_URL: &str = "STUDY_AI_BASE_URL";
pub const ENV_MODEL: &str = "STUDY_AI_MODEL";
pub const ENV_QUIZ_STREAM_URL: &str = "STUDY_QUIZ_STREAM_URL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection details for an OpenAI-compatible chat completions API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: Option<String>,
}

impl AiConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::resolve(&AppSettings::default(), |key| env::var(key).ok())
    }

    /// Saved settings win over the environment; `None` when no API key is
    /// available from either source.
    #[must_use]
    pub fn resolve(settings: &AppSettings, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let env_value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = settings
            .api_key()
            .map(str::to_owned)
            .or_else(|| env_value(ENV_API_KEY))?;
        let base_url = settings
            .api_base_url()
            .map(str::to_owned)
            .or_else(|| env_value(ENV_BASE_URL))
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = settings
            .api_model()
            .map(str::to_owned)
            .or_else(|| env_value(ENV_MODEL))
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        Some(Self {
            base_url,
            api_key,
            model,
            system_prompt: settings.ai_system_prompt().map(str::to_owned),
        })
    }
}

/// Where the remote quiz generator streams progress records from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizStreamConfig {
    pub endpoint: String,
}

impl QuizStreamConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::resolve(&AppSettings::default(), |key| env::var(key).ok())
    }

    #[must_use]
    pub fn resolve(settings: &AppSettings, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let endpoint = settings
            .quiz_stream_url()
            .map(str::to_owned)
            .or_else(|| lookup(ENV_QUIZ_STREAM_URL).filter(|v| !v.trim().is_empty()))?;
        Some(Self { endpoint })
    }
}
