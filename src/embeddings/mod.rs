//! Embedding generation.
//!
//! This module provides:
//! - The [`Embedder`] trait consumed by the sync executor and query path
//! - An OpenAI-compatible HTTP client
//! - A deterministic hash embedder for offline runs

mod hash;
mod service;

pub use hash::{hash_embedding, HashEmbedder};
pub use service::{Embedder, EmbeddingConfig, OpenAiEmbedder};

/// Vector size of all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
