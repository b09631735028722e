#![forbid(unsafe_code)]

pub mod ai;
pub mod app_services;
pub mod app_settings_service;
pub mod chat;
pub mod config;
pub mod error;
pub mod line_decoder;
pub mod quiz;

pub use study_core::Clock;

pub use ai::{AiClient, ChatModel, TextStream, TitleGenerator};
pub use app_services::AppServices;
pub use app_settings_service::AppSettingsService;
pub use chat::{AI_ERROR_TEXT, RegenerateOutcome, SendOutcome, SessionMessageStore};
pub use config::{AiConfig, QuizStreamConfig};
pub use error::{AiError, AppServicesError, AppSettingsServiceError, MessageStoreError, QuizStreamError};
pub use line_decoder::{LineDecoder, records};
pub use quiz::{
    HttpQuizExchange, LocalQuizExchange, QuizAuthor, QuizExchange, QuizProducer, QuizStreamClient,
    consume_quiz_stream,
};
