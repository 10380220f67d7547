//! Configuration management for docsync.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{Config, EmbeddingProvider, IndexBackend};
