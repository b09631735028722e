use thiserror::Error;
use url::Url;

/// User-editable configuration for the AI backend and quiz stream endpoint.
///
/// Every field is optional; unset values fall back to environment defaults
/// when the services are assembled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppSettings {
    api_key: Option<String>,
    api_model: Option<String>,
    api_base_url: Option<String>,
    ai_system_prompt: Option<String>,
    quiz_stream_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AppSettingsDraft {
    pub api_key: Option<String>,
    pub api_model: Option<String>,
    pub api_base_url: Option<String>,
    pub ai_system_prompt: Option<String>,
    pub quiz_stream_url: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AppSettingsError {
    #[error("invalid {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

impl AppSettingsDraft {
    /// Trim every field, drop blanks, and check that URLs are http(s).
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsError::InvalidUrl` if a URL field is present but
    /// does not parse as an http or https URL.
    pub fn validate(self) -> Result<AppSettings, AppSettingsError> {
        let api_base_url = normalize_optional(self.api_base_url);
        let quiz_stream_url = normalize_optional(self.quiz_stream_url);
        check_url("api_base_url", api_base_url.as_deref())?;
        check_url("quiz_stream_url", quiz_stream_url.as_deref())?;

        Ok(AppSettings {
            api_key: normalize_optional(self.api_key),
            api_model: normalize_optional(self.api_model),
            api_base_url,
            ai_system_prompt: normalize_optional(self.ai_system_prompt),
            quiz_stream_url,
        })
    }
}

impl AppSettings {
    /// Rebuild settings from stored columns, re-running validation.
    ///
    /// # Errors
    ///
    /// Returns `AppSettingsError` if a stored URL is no longer valid.
    pub fn from_persisted(draft: AppSettingsDraft) -> Result<Self, AppSettingsError> {
        draft.validate()
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn api_model(&self) -> Option<&str> {
        self.api_model.as_deref()
    }

    #[must_use]
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    #[must_use]
    pub fn ai_system_prompt(&self) -> Option<&str> {
        self.ai_system_prompt.as_deref()
    }

    #[must_use]
    pub fn quiz_stream_url(&self) -> Option<&str> {
        self.quiz_stream_url.as_deref()
    }
}

fn check_url(field: &'static str, value: Option<&str>) -> Result<(), AppSettingsError> {
    let Some(value) = value else {
        return Ok(());
    };
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppSettingsError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
