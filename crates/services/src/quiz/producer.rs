use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use study_core::model::{ProgressEvent, Question, QuizRequest};

use crate::error::{AiError, QuizStreamError};

pub const DEFAULT_QUESTION_COUNT: u32 = 5;

/// Writes quiz content. Implemented by the AI client; faked in tests.
#[async_trait]
pub trait QuizAuthor: Send + Sync {
    async fn subtopics(&self, request: &QuizRequest) -> Result<Vec<String>, AiError>;

    async fn question(
        &self,
        request: &QuizRequest,
        subtopic: &str,
        index: u32,
        total: u32,
    ) -> Result<Question, AiError>;
}

/// Drives a `QuizAuthor` through a generation job and reports progress.
///
/// Questions are spread round-robin over the subtopics. A failed question is
/// skipped; the job only fails outright when subtopics cannot be produced or
/// no question at all succeeds. Every run ends with exactly one terminal
/// event.
#[derive(Clone)]
pub struct QuizProducer {
    author: Arc<dyn QuizAuthor>,
    question_count: u32,
}

impl QuizProducer {
    #[must_use]
    pub fn new(author: Arc<dyn QuizAuthor>) -> Self {
        Self {
            author,
            question_count: DEFAULT_QUESTION_COUNT,
        }
    }

    #[must_use]
    pub fn with_question_count(mut self, question_count: u32) -> Self {
        self.question_count = question_count.max(1);
        self
    }

    pub fn produce(&self, request: QuizRequest) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let author = Arc::clone(&self.author);
        let total = self.question_count;

        async_stream::stream! {
            yield ProgressEvent::GeneratingSubtopics;

            let subtopics = match author.subtopics(&request).await {
                Ok(subtopics) if !subtopics.is_empty() => subtopics,
                Ok(_) => {
                    yield ProgressEvent::Error { message: "no subtopics generated".into() };
                    return;
                }
                Err(err) => {
                    tracing::warn!(topic = %request.topic, error = %err, "subtopic generation failed");
                    yield ProgressEvent::Error { message: err.to_string() };
                    return;
                }
            };
            yield ProgressEvent::SubtopicsGenerated { subtopics: subtopics.clone() };

            let mut questions = Vec::new();
            for index in 0..total {
                let slot = usize::try_from(index).unwrap_or_default() % subtopics.len();
                let subtopic = subtopics[slot].clone();
                yield ProgressEvent::GeneratingQuestion {
                    current: index + 1,
                    total,
                    subtopic: subtopic.clone(),
                };

                match author.question(&request, &subtopic, index, total).await {
                    Ok(question) => {
                        let question = question.with_index(index);
                        questions.push(question.clone());
                        yield ProgressEvent::QuestionGenerated { question };
                    }
                    Err(err) => {
                        tracing::warn!(index, subtopic = %subtopic, error = %err, "skipping failed question");
                    }
                }
            }

            if questions.is_empty() {
                yield ProgressEvent::Error { message: QuizStreamError::NoQuestions.to_string() };
            } else {
                let produced = u32::try_from(questions.len()).unwrap_or(u32::MAX);
                yield ProgressEvent::Completed { questions, total: Some(produced) };
            }
        }
    }

    /// `produce`, encoded as the newline-delimited wire body.
    pub fn produce_records(
        &self,
        request: QuizRequest,
    ) -> impl Stream<Item = Result<Bytes, QuizStreamError>> + Send + 'static {
        self.produce(request).map(|event| encode_record(&event))
    }
}

/// One progress event as a JSON line.
///
/// # Errors
///
/// Returns `QuizStreamError::Encode` if serialization fails.
pub fn encode_record(event: &ProgressEvent) -> Result<Bytes, QuizStreamError> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
