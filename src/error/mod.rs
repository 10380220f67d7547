//! Error types and Result aliases for docsync.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Errors fall into three operational classes:
//! - transient collaborator failures (index, embedding or answer service
//!   unreachable), retried by the next triggered cycle
//! - capacity errors, fatal to one sync cycle
//! - configuration errors, fatal to process startup

use std::time::Duration;

use thiserror::Error;

/// Result type alias using docsync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Vector index error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Answer (language model) error.
    #[error("answer error: {0}")]
    Answer(#[from] AnswerError),

    /// Reconciliation error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Server/API error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Vector index errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Index could not be reached (connection refused, timeout).
    #[error("index unavailable: {0}")]
    Unavailable(String),

    /// Index rejected a request.
    #[error("index request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Collection schema mismatch.
    #[error("schema error: {0}")]
    Schema(String),

    /// Malformed response from the index.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Embedding-specific errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Embedding service could not be reached.
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    /// Embedding service rejected the request.
    #[error("embedding request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    /// Response did not contain a usable vector.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    /// Vector length differs from the configured dimension.
    #[error("expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

/// Language model errors.
#[derive(Error, Debug)]
pub enum AnswerError {
    /// Completion service could not be reached.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),

    /// Completion service rejected the request.
    #[error("completion request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    /// Model returned no content.
    #[error("completion returned no content")]
    EmptyResponse,
}

/// Reconciliation cycle errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The index holds more records than a snapshot may read.
    #[error("index holds more than {limit} records; refusing to reconcile against a truncated snapshot")]
    CapacityExceeded { limit: usize },

    /// The cycle did not finish in time.
    #[error("sync cycle timed out after {after:?}")]
    Timeout { after: Duration },

    /// Background task failed.
    #[error("sync task failed: {0}")]
    Task(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

/// Server/API errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Request handling error.
    #[error("request error: {0}")]
    Request(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error is a collaborator outage that a later cycle may
    /// recover from.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Unavailable(_))
                | Self::Embedding(EmbeddingError::Unavailable(_))
                | Self::Answer(AnswerError::Unavailable(_))
                | Self::Sync(SyncError::Timeout { .. })
        )
    }

    /// Whether the index collaborator as a whole is unreachable.
    #[must_use]
    pub const fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Unavailable(_)))
    }
}

impl StorageError {
    /// Classify a transport-level `reqwest` failure.
    pub(crate) fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
