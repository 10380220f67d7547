//! Embedded vector index backed by `SQLite`.
//!
//! Stores one row per document with its embedding as a BLOB and answers
//! similarity queries with an exact scan. Suitable for local corpora of a
//! few thousand documents and for tests.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::connection::Database;
use super::index::{Distance, VectorIndex};
use super::models::{DocumentRecord, IndexedRecord, ScoredDocument};
use super::schema::{migrate, verify_schema};
use super::vector::{blob_to_vec, similarity, vec_to_blob};
use crate::error::StorageError;
use crate::Result;

const META_DIMENSION: &str = "dimension";
const META_DISTANCE: &str = "distance";

/// `SQLite` implementation of [`VectorIndex`].
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    db: Database,
}

impl SqliteIndex {
    /// Wrap an open database. Call [`VectorIndex::ensure_schema`] before use.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open an in-memory index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn layout(conn: &Connection) -> Result<Option<(usize, Distance)>> {
        let dimension = read_meta(conn, META_DIMENSION)?;
        let distance = read_meta(conn, META_DISTANCE)?;

        match (dimension, distance) {
            (Some(dim), Some(dist)) => {
                let dim = dim.parse::<usize>().map_err(|e| {
                    StorageError::Schema(format!("stored dimension '{dim}' is invalid: {e}"))
                })?;
                Ok(Some((dim, Distance::parse(&dist)?)))
            }
            _ => Ok(None),
        }
    }

    fn require_layout(conn: &Connection) -> Result<(usize, Distance)> {
        Self::layout(conn)?.ok_or_else(|| {
            StorageError::Schema("collection not initialised; call ensure_schema first".into())
                .into()
        })
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM index_meta WHERE key = ?",
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| StorageError::from(e).into())
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)",
        [key, value],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_schema(&self, dimension: usize, distance: Distance) -> Result<()> {
        self.db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)?;

            match Self::layout(conn)? {
                Some((existing_dim, existing_distance)) => {
                    if existing_dim != dimension || existing_distance != distance {
                        return Err(StorageError::Schema(format!(
                            "index was created with {existing_dim} dims / {existing_distance}, \
                             requested {dimension} dims / {distance}"
                        ))
                        .into());
                    }
                    tracing::debug!(dimension, %distance, "Index schema already present");
                }
                None => {
                    write_meta(conn, META_DIMENSION, &dimension.to_string())?;
                    write_meta(conn, META_DISTANCE, distance.as_str())?;
                    tracing::info!(dimension, %distance, path = %self.db.path(), "Created index schema");
                }
            }
            Ok(())
        })
    }

    async fn list_all(&self, limit: usize) -> Result<Vec<IndexedRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, source, content_hash FROM documents ORDER BY id LIMIT ?")
                .map_err(StorageError::from)?;

            let records = stmt
                .query_map([limit], |row| {
                    Ok(IndexedRecord::new(
                        row.get::<_, String>(0)?,
                        row.get(1)?,
                        row.get(2)?,
                    ))
                })
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;

            Ok(records)
        })
    }

    async fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        self.db.with_conn(|conn| {
            let (dimension, _) = Self::require_layout(conn)?;
            if record.embedding.len() != dimension {
                return Err(StorageError::Schema(format!(
                    "vector for '{}' has {} dims, collection expects {dimension}",
                    record.source,
                    record.embedding.len()
                ))
                .into());
            }

            conn.execute(
                "INSERT OR REPLACE INTO documents (id, source, content_hash, text, embedding, indexed_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.source,
                    record.content_hash,
                    record.text,
                    vec_to_blob(&record.embedding),
                    chrono::Utc::now().timestamp(),
                ],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM documents WHERE id = ?", [id])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        self.db.with_conn(|conn| {
            let (_, distance) = Self::require_layout(conn)?;
            let mut stmt = conn
                .prepare("SELECT id, source, text, embedding FROM documents")
                .map_err(StorageError::from)?;

            let mut hits = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok(ScoredDocument {
                        id: row.get(0)?,
                        source: row.get(1)?,
                        text: row.get(2)?,
                        score: similarity(distance, vector, &blob_to_vec(&blob)),
                    })
                })
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;

            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(top_k);
            Ok(hits)
        })
    }

    async fn count(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(StorageError::from)?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn index() -> SqliteIndex {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_schema(3, Distance::Cosine).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_upsert_and_list() {
        let index = index().await;
        let record = DocumentRecord::new("a.txt", "h1", "hello", vec![1.0, 0.0, 0.0]);
        index.upsert(&record).await.unwrap();

        let all = index.list_all(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);
        assert_eq!(all[0].source.as_deref(), Some("a.txt"));
        assert_eq!(all[0].content_hash.as_deref(), Some("h1"));
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_all_respects_limit() {
        let index = index().await;
        for i in 0..5 {
            let record = DocumentRecord::new(format!("{i}.txt"), "h", "x", vec![1.0, 0.0, 0.0]);
            index.upsert(&record).await.unwrap();
        }
        assert_eq!(index.list_all(3).await.unwrap().len(), 3);
        assert_eq!(index.list_all(100).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = index().await;
        let record = DocumentRecord::new("a.txt", "h1", "hello", vec![1.0, 0.0, 0.0]);
        index.upsert(&record).await.unwrap();

        index.delete(&record.id).await.unwrap();
        index.delete(&record.id).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = index().await;
        index
            .upsert(&DocumentRecord::new("x.txt", "h", "x axis", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(&DocumentRecord::new("y.txt", "h", "y axis", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(&DocumentRecord::new("xy.txt", "h", "diagonal", vec![1.0, 1.0, 0.0]))
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source.as_deref(), Some("x.txt"));
        assert_eq!(hits[1].source.as_deref(), Some("xy.txt"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let index = index().await;
        let record = DocumentRecord::new("a.txt", "h", "hello", vec![1.0]);
        let err = index.upsert(&record).await.unwrap_err();
        assert!(err.to_string().contains("collection expects 3"));
    }

    #[tokio::test]
    async fn test_ensure_schema_detects_mismatch() {
        let index = index().await;
        index.ensure_schema(3, Distance::Cosine).await.unwrap();

        let err = index.ensure_schema(384, Distance::Cosine).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_before_schema_fails() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .database()
            .with_conn(migrate)
            .unwrap();
        let record = DocumentRecord::new("a.txt", "h", "hello", vec![1.0]);
        assert!(index.upsert(&record).await.is_err());
    }
}
