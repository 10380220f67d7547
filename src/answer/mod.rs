//! Answer collaborator (language model).
//!
//! Only the query path uses this module; reconciliation never calls it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnswerError;
use crate::Result;

/// Produces a completion for a system and user prompt.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Model identifier for logs.
    fn model_name(&self) -> &str;

    /// Generate a completion.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Chat completion client configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL, e.g. `https://api.groq.com/openai/v1`.
    pub url: String,
    /// Model name.
    pub model: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ChatConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatCompletionsClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build chat client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.url.trim_end_matches('/'))
    }
}

fn first_content(response: ChatResponse) -> std::result::Result<String, AnswerError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(AnswerError::EmptyResponse)
}

#[async_trait]
impl AnswerModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnswerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(AnswerError::Unavailable(format!("{status}: {body}")).into());
            }
            return Err(AnswerError::Request {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnswerError::Unavailable(format!("unreadable completion: {e}")))?;

        tracing::debug!(model = %self.config.model, "Completion received");
        Ok(first_content(parsed)?)
    }
}
