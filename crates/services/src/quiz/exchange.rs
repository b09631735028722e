use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use study_core::model::QuizRequest;

use super::producer::QuizProducer;
use crate::config::QuizStreamConfig;
use crate::error::QuizStreamError;

/// Raw response body of a quiz generation exchange.
pub type ByteStream = BoxStream<'static, Result<Bytes, QuizStreamError>>;

/// Opens the network exchange that carries quiz progress records.
#[async_trait]
pub trait QuizExchange: Send + Sync {
    /// Start generation and hand back the body, or fail before any record is
    /// read.
    async fn open(&self, request: &QuizRequest) -> Result<ByteStream, QuizStreamError>;
}

/// Posts the request to a remote generator and streams its response body.
#[derive(Clone)]
pub struct HttpQuizExchange {
    client: Client,
    config: QuizStreamConfig,
}

impl HttpQuizExchange {
    #[must_use]
    pub fn new(config: QuizStreamConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl QuizExchange for HttpQuizExchange {
    async fn open(&self, request: &QuizRequest) -> Result<ByteStream, QuizStreamError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(ACCEPT, "application/x-ndjson")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuizStreamError::HttpStatus(status));
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(QuizStreamError::NoBody);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| QuizStreamError::Transport(e.to_string())))
            .boxed())
    }
}

/// Runs a `QuizProducer` in-process and exposes its encoded records as the
/// exchange body, for when no remote generator is configured.
#[derive(Clone)]
pub struct LocalQuizExchange {
    producer: QuizProducer,
}

impl LocalQuizExchange {
    #[must_use]
    pub fn new(producer: QuizProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl QuizExchange for LocalQuizExchange {
    async fn open(&self, request: &QuizRequest) -> Result<ByteStream, QuizStreamError> {
        Ok(self.producer.produce_records(request.clone()).boxed())
    }
}
