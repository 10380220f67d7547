//! The vector index seam.
//!
//! Every backend implements [`VectorIndex`]. The sync executor is the only
//! caller of the mutating methods; the query path only reads.

use async_trait::async_trait;

use super::models::{DocumentRecord, IndexedRecord, ScoredDocument};
use crate::error::StorageError;
use crate::Result;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    /// Name as used by Qdrant and stored in index metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
            Self::Euclid => "Euclid",
        }
    }

    /// Parse a stored metric name.
    ///
    /// # Errors
    ///
    /// Returns a schema error for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "Cosine" => Ok(Self::Cosine),
            "Dot" => Ok(Self::Dot),
            "Euclid" => Ok(Self::Euclid),
            other => Err(StorageError::Schema(format!("unknown distance '{other}'")).into()),
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vector store holding one record per document.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for logs and status output.
    fn name(&self) -> &'static str;

    /// Create the collection if missing and check its vector layout.
    async fn ensure_schema(&self, dimension: usize, distance: Distance) -> Result<()>;

    /// Read up to `limit` records, payload only.
    async fn list_all(&self, limit: usize) -> Result<Vec<IndexedRecord>>;

    /// Insert or replace a record by id.
    async fn upsert(&self, record: &DocumentRecord) -> Result<()>;

    /// Delete a record by id. Deleting an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Return the `top_k` records most similar to `vector`.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;

    /// Number of records in the collection.
    async fn count(&self) -> Result<usize>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_round_trip_names() {
        for distance in [Distance::Cosine, Distance::Dot, Distance::Euclid] {
            assert_eq!(Distance::parse(distance.as_str()).unwrap(), distance);
        }
    }

    #[test]
    fn test_distance_parse_unknown() {
        let err = Distance::parse("Manhattan").unwrap_err();
        assert!(err.to_string().contains("Manhattan"));
    }

    #[test]
    fn test_default_is_cosine() {
        assert_eq!(Distance::default(), Distance::Cosine);
        assert_eq!(Distance::Cosine.to_string(), "Cosine");
    }
}
