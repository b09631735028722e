use serde::{Deserialize, Serialize};

use super::quiz::Question;

/// Status updates streamed while a quiz is being generated.
///
/// Serialized as one JSON object per record, discriminated by `kind`.
/// `Completed` and `Error` are terminal: exactly one of them ends a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    GeneratingSubtopics,
    SubtopicsGenerated {
        subtopics: Vec<String>,
    },
    GeneratingQuestion {
        current: u32,
        total: u32,
        subtopic: String,
    },
    QuestionGenerated {
        question: Question,
    },
    Completed {
        #[serde(default)]
        questions: Vec<Question>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }

    /// Wire name of the variant, handy for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GeneratingSubtopics => "generating_subtopics",
            Self::SubtopicsGenerated { .. } => "subtopics_generated",
            Self::GeneratingQuestion { .. } => "generating_question",
            Self::QuestionGenerated { .. } => "question_generated",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}
