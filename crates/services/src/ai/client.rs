use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use study_core::model::{Question, QuizRequest, SessionId};

use super::prompts::{clean_title, parse_json_reply, question_prompt, subtopics_prompt, title_prompt};
use super::{ChatModel, TextStream, TitleGenerator};
use crate::config::AiConfig;
use crate::error::AiError;
use crate::line_decoder::records;
use crate::quiz::QuizAuthor;

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Stateless: each call sends the optional system prompt and one user
/// message, so chat replies are single-turn.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    config: Option<AiConfig>,
}

impl AiClient {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(AiConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<AiConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Generate a full completion for a prompt.
    ///
    /// # Errors
    ///
    /// Returns `AiError` when the client is disabled, the request fails,
    /// or the response is empty.
    pub async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let config = self.config.as_ref().ok_or(AiError::Disabled)?;
        let response = self
            .client
            .post(completions_url(config))
            .bearer_auth(&config.api_key)
            .json(&ChatRequest::new(config, prompt, false))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }

    /// Stream a completion as text deltas.
    ///
    /// The server-sent events body is framed with the same line decoder as
    /// quiz progress records; only `data:` lines carry content and `[DONE]`
    /// ends the stream.
    ///
    /// # Errors
    ///
    /// Returns `AiError` when the client is disabled or the request cannot be
    /// opened. Errors while reading arrive as stream items.
    pub async fn complete_stream(&self, prompt: &str) -> Result<TextStream, AiError> {
        let config = self.config.as_ref().ok_or(AiError::Disabled)?;
        let response = self
            .client
            .post(completions_url(config))
            .bearer_auth(&config.api_key)
            .json(&ChatRequest::new(config, prompt, true))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let lines = records(response.bytes_stream());
        let deltas = async_stream::stream! {
            let mut lines = std::pin::pin!(lines);
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        yield Err(AiError::Http(err));
                        return;
                    }
                };
                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    return;
                }
                match serde_json::from_str::<ChatStreamChunk>(data) {
                    Ok(chunk) => {
                        let text: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    Err(err) => tracing::debug!(error = %err, "skipping unparseable completion chunk"),
                }
            }
        };

        Ok(deltas.boxed())
    }
}

fn completions_url(config: &AiConfig) -> String {
    format!("{}/chat/completions", config.base_url.trim_end_matches('/'))
}

#[async_trait]
impl ChatModel for AiClient {
    async fn reply(&self, session_id: SessionId, text: &str) -> Result<String, AiError> {
        tracing::debug!(%session_id, "requesting chat reply");
        self.complete(text).await
    }

    async fn reply_stream(&self, session_id: SessionId, text: &str) -> Result<TextStream, AiError> {
        tracing::debug!(%session_id, "requesting streamed chat reply");
        self.complete_stream(text).await
    }
}

#[async_trait]
impl TitleGenerator for AiClient {
    async fn generate_title(&self, session_id: SessionId, seed: &str) -> Result<String, AiError> {
        tracing::debug!(%session_id, "requesting session title");
        let raw = self.complete(&title_prompt(seed)).await?;
        clean_title(&raw)
    }
}

#[async_trait]
impl QuizAuthor for AiClient {
    async fn subtopics(&self, request: &QuizRequest) -> Result<Vec<String>, AiError> {
        let raw = self.complete(&subtopics_prompt(request)).await?;
        let subtopics: Vec<String> = parse_json_reply(&raw)?;
        Ok(subtopics
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn question(
        &self,
        request: &QuizRequest,
        subtopic: &str,
        index: u32,
        total: u32,
    ) -> Result<Question, AiError> {
        let raw = self
            .complete(&question_prompt(request, subtopic, index, total))
            .await?;
        parse_json_reply(&raw)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl ChatRequest {
    fn new(config: &AiConfig, prompt: &str, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });
        Self {
            model: config.model.clone(),
            messages,
            temperature: 0.2,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatDelta,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}
