use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice quiz question.
///
/// Construction always validates, including deserialization, so a `Question`
/// in hand has at least two options and an answer that is one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuestionWire")]
pub struct Question {
    question: String,
    options: Vec<String>,
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wrong_explanation: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    question_index: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyQuestion,
    #[error("question needs at least two options, got {0}")]
    TooFewOptions(usize),
    #[error("answer `{0}` is not one of the options")]
    AnswerNotAnOption(String),
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is blank, fewer than two options are
    /// given, or the answer does not equal one of the options.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        answer: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let question = question.into();
        let answer = answer.into();

        if question.trim().is_empty() {
            return Err(QuestionError::EmptyQuestion);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions(options.len()));
        }
        if !options.iter().any(|option| *option == answer) {
            return Err(QuestionError::AnswerNotAnOption(answer));
        }

        Ok(Self {
            question,
            options,
            answer,
            explanation: None,
            wrong_explanation: None,
            question_index: None,
        })
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn with_wrong_explanations(mut self, wrong: BTreeMap<String, String>) -> Self {
        self.wrong_explanation = Some(wrong);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: u32) -> Self {
        self.question_index = Some(index);
        self
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Explanation shown when the given (wrong) option was picked.
    #[must_use]
    pub fn wrong_explanation(&self, option: &str) -> Option<&str> {
        self.wrong_explanation
            .as_ref()
            .and_then(|map| map.get(option))
            .map(String::as_str)
    }

    #[must_use]
    pub fn question_index(&self) -> Option<u32> {
        self.question_index
    }

    #[must_use]
    pub fn is_correct(&self, choice: &str) -> bool {
        self.answer == choice
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionWire {
    question: String,
    options: Vec<String>,
    answer: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    wrong_explanation: Option<BTreeMap<String, String>>,
    #[serde(default)]
    question_index: Option<u32>,
}

impl TryFrom<QuestionWire> for Question {
    type Error = QuestionError;

    fn try_from(wire: QuestionWire) -> Result<Self, Self::Error> {
        let mut question = Question::new(wire.question, wire.options, wire.answer)?;
        question.explanation = wire.explanation;
        question.wrong_explanation = wire.wrong_explanation;
        question.question_index = wire.question_index;
        Ok(question)
    }
}

//
// ─── QUIZ REQUEST ──────────────────────────────────────────────────────────────
//

/// Source material attached to a quiz request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDocument {
    pub name: String,
    pub content: String,
}

/// What the client asks the quiz generator for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRequest {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<QuizDocument>,
}

impl QuizRequest {
    #[must_use]
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            document: None,
        }
    }

    #[must_use]
    pub fn with_document(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.document = Some(QuizDocument {
            name: name.into(),
            content: content.into(),
        });
        self
    }
}
