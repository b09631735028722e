use std::sync::Arc;

use futures::{Stream, StreamExt};
use study_core::model::{ProgressEvent, Question, QuizRequest};

use super::exchange::QuizExchange;
use crate::error::QuizStreamError;
use crate::line_decoder::records;

/// Drain a quiz progress body into the generated questions.
///
/// `on_progress` sees every well-formed event in arrival order, before the
/// next record is read. Malformed records are logged and skipped.
///
/// # Errors
///
/// Returns `QuizStreamError::Generator` for an `error` event, the transport
/// error if the body breaks off, and `QuizStreamError::NoQuestions` when the
/// body ends without a terminal event or any question.
pub async fn consume_quiz_stream<S, B, E, F>(
    chunks: S,
    mut on_progress: F,
) -> Result<Vec<Question>, QuizStreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    QuizStreamError: From<E>,
    F: FnMut(&ProgressEvent),
{
    let mut lines = std::pin::pin!(records(chunks));
    let mut questions = Vec::new();

    while let Some(line) = lines.next().await {
        let line = line?;
        let event: ProgressEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, record = %line, "skipping malformed progress record");
                continue;
            }
        };
        tracing::debug!(kind = event.kind(), "quiz progress");
        on_progress(&event);

        match event {
            ProgressEvent::QuestionGenerated { question } => questions.push(question),
            ProgressEvent::Completed {
                questions: final_questions,
                ..
            } => {
                if final_questions.is_empty() {
                    return Ok(questions);
                }
                return Ok(final_questions);
            }
            ProgressEvent::Error { message } => return Err(QuizStreamError::Generator(message)),
            ProgressEvent::GeneratingSubtopics
            | ProgressEvent::SubtopicsGenerated { .. }
            | ProgressEvent::GeneratingQuestion { .. } => {}
        }
    }

    if questions.is_empty() {
        return Err(QuizStreamError::NoQuestions);
    }
    tracing::debug!(
        count = questions.len(),
        "quiz stream ended without a terminal event"
    );
    Ok(questions)
}

/// Runs quiz generations over a `QuizExchange`.
#[derive(Clone)]
pub struct QuizStreamClient {
    exchange: Arc<dyn QuizExchange>,
}

impl QuizStreamClient {
    #[must_use]
    pub fn new(exchange: Arc<dyn QuizExchange>) -> Self {
        Self { exchange }
    }

    /// Generate a quiz, reporting progress as it streams in.
    ///
    /// # Errors
    ///
    /// Returns `QuizStreamError::EmptyTopic` for a blank topic, any failure
    /// opening the exchange, and every terminal failure of
    /// [`consume_quiz_stream`].
    pub async fn generate<F>(
        &self,
        request: &QuizRequest,
        on_progress: F,
    ) -> Result<Vec<Question>, QuizStreamError>
    where
        F: FnMut(&ProgressEvent),
    {
        if request.topic.trim().is_empty() {
            return Err(QuizStreamError::EmptyTopic);
        }
        let body = self.exchange.open(request).await?;
        consume_quiz_stream(body, on_progress).await
    }
}
