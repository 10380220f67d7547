//! docsync
//!
//! Keeps a vector-indexed document store synchronized with a directory of
//! plain-text files and answers questions by retrieving similar documents
//! and forwarding them to a language model.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod answer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod query;
pub mod server;
pub mod storage;
pub mod sync;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
