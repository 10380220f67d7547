//! Vector index backends.
//!
//! This module provides:
//! - The [`VectorIndex`] trait used by the sync executor and query path
//! - A Qdrant backend speaking its HTTP API
//! - An embedded `SQLite` backend for local use and tests

mod connection;
mod index;
mod models;
mod qdrant;
mod schema;
mod sqlite;
mod vector;

pub use connection::Database;
pub use index::{Distance, VectorIndex};
pub use models::{
    DocumentRecord, IndexedRecord, ScoredDocument, PAYLOAD_CONTENT_HASH, PAYLOAD_SOURCE,
    PAYLOAD_TEXT,
};
pub use qdrant::{PointId, QdrantConfig, QdrantIndex};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use sqlite::SqliteIndex;
pub use vector::{blob_to_vec, cosine_similarity, vec_to_blob};
