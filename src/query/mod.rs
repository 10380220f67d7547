//! Retrieval-augmented question answering.
//!
//! Reads the index only. Never triggers reconciliation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::AnswerModel;
use crate::embeddings::Embedder;
use crate::storage::VectorIndex;
use crate::{Error, Result};

/// System prompt sent with every question.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Body of `POST /ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Answer plus the retrieved context it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub context_used: String,
}

/// Build the user prompt for a question and its retrieved context.
#[must_use]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context: {context}\n\nQuestion: {question}\nAnswer:")
}

/// Embeds a question, retrieves similar documents and asks the model.
#[derive(Clone)]
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    answer: Arc<dyn AnswerModel>,
    top_k: usize,
}

impl QueryService {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        answer: Arc<dyn AnswerModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            answer,
            top_k,
        }
    }

    /// Answer a question from the indexed documents.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a blank question, and the
    /// collaborator's error if embedding, search or completion fails.
    pub async fn ask(&self, question: &str) -> Result<AskResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::config("question cannot be empty"));
        }

        let vector = self.embedder.embed(question).await?;
        let hits = self.index.search(&vector, self.top_k).await?;

        tracing::debug!(
            hits = hits.len(),
            sources = ?hits.iter().filter_map(|h| h.source.as_deref()).collect::<Vec<_>>(),
            "Retrieved context"
        );

        let context_used = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let answer = self
            .answer
            .complete(SYSTEM_PROMPT, &build_prompt(&context_used, question))
            .await?;

        Ok(AskResponse {
            answer,
            context_used,
        })
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("embedder", &self.embedder.model_name())
            .field("index", &self.index.name())
            .field("answer", &self.answer.model_name())
            .field("top_k", &self.top_k)
            .finish()
    }
}
