mod app_settings;
mod ids;
mod message;
mod progress;
mod quiz;
mod session;

pub use app_settings::{AppSettings, AppSettingsDraft, AppSettingsError};
pub use ids::{MessageId, ParseIdError, SessionId};
pub use message::{DisplayMeta, Message, MessagePatch, Role};
pub use progress::ProgressEvent;
pub use quiz::{Question, QuestionError, QuizDocument, QuizRequest};
pub use session::Session;
