use thiserror::Error;

use crate::model::{AppSettingsError, QuestionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    AppSettings(#[from] AppSettingsError),
}
