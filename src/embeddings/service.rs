//! Embedding collaborator.
//!
//! Provides the [`Embedder`] seam and an OpenAI-compatible HTTP client.
//! Any server exposing `POST {base}/embeddings` works: a hosted API, a
//! local text-embeddings server, or an Ollama/LM Studio compatibility
//! endpoint serving all-MiniLM-L6-v2.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EmbeddingError;
use crate::Result;

/// Produces fixed-length vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier for logs.
    fn model_name(&self) -> &str;

    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// HTTP embedding client configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL, e.g. `http://localhost:8081/v1`.
    pub url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Expected vector length.
    pub dimension: usize,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after a rate-limit, server or network error.
    pub max_retries: u32,
}

impl EmbeddingConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            dimension,
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbedder {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build embedding client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.url.trim_end_matches('/'))
    }

    async fn request_once(&self, text: &str) -> std::result::Result<Vec<f32>, Attempt> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": [text],
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Attempt::Retry(EmbeddingError::Unavailable(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                Attempt::Retry(EmbeddingError::Unavailable(format!("{status}: {body}")))
            } else {
                Attempt::Fail(EmbeddingError::Request {
                    status: status.as_u16(),
                    body,
                })
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fail(EmbeddingError::InvalidResponse(e.to_string())))?;

        parse_single(parsed, self.config.dimension).map_err(Attempt::Fail)
    }
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Retry(EmbeddingError),
    Fail(EmbeddingError),
}

fn parse_single(
    response: EmbeddingResponse,
    dimension: usize,
) -> std::result::Result<Vec<f32>, EmbeddingError> {
    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbeddingError::InvalidResponse("response has no data".to_string()))?;

    if vector.len() != dimension {
        return Err(EmbeddingError::Dimension {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.request_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(Attempt::Fail(e)) => return Err(e.into()),
                Err(Attempt::Retry(e)) => {
                    if attempt >= self.config.max_retries {
                        return Err(e.into());
                    }
                    let delay = Duration::from_millis(500 << attempt.min(5));
                    tracing::debug!(attempt, ?delay, error = %e, "Retrying embedding request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
