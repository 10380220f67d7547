//! Data models for index operations.
//!
//! This module defines the records exchanged with the vector index:
//! - Full document records written by the sync executor
//! - Payload-only records read back for snapshots
//! - Scored documents returned by similarity search

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload key holding the document's file name.
pub const PAYLOAD_SOURCE: &str = "source";

/// Payload key holding the content fingerprint.
pub const PAYLOAD_CONTENT_HASH: &str = "content_hash";

/// Payload key holding the raw document text.
pub const PAYLOAD_TEXT: &str = "text";

/// A document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Opaque identifier assigned at insert time.
    pub id: String,

    /// File name of the document (identity key).
    pub source: String,

    /// Fingerprint of `text` at index time.
    pub content_hash: String,

    /// Full document content.
    pub text: String,

    /// Embedding of `text`.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl DocumentRecord {
    /// Create a record with a freshly generated id.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        content_hash: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            content_hash: content_hash.into(),
            text: text.into(),
            embedding,
        }
    }

    /// Payload object carried next to the vector.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            PAYLOAD_SOURCE: self.source,
            PAYLOAD_CONTENT_HASH: self.content_hash,
            PAYLOAD_TEXT: self.text,
        })
    }
}

/// Payload-only view of an index entry.
///
/// `source` and `content_hash` are optional because the index may hold
/// entries written by other tools or by older versions that did not
/// record a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub source: Option<String>,
    pub content_hash: Option<String>,
}

impl IndexedRecord {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: Option<String>,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            content_hash,
        }
    }
}

/// Similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub source: Option<String>,
    pub text: String,
    /// Higher is more similar.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_record_new_generates_unique_ids() {
        let a = DocumentRecord::new("a.txt", "h", "hello", vec![0.1]);
        let b = DocumentRecord::new("a.txt", "h", "hello", vec![0.1]);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_payload_fields() {
        let record = DocumentRecord::new("a.txt", "abc", "hello", vec![]);
        let payload = record.payload();
        assert_eq!(payload[PAYLOAD_SOURCE], "a.txt");
        assert_eq!(payload[PAYLOAD_CONTENT_HASH], "abc");
        assert_eq!(payload[PAYLOAD_TEXT], "hello");
    }

    #[test]
    fn test_embedding_not_serialized() {
        let record = DocumentRecord::new("a.txt", "abc", "hello", vec![1.0, 2.0]);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("embedding").is_none());
    }
}
