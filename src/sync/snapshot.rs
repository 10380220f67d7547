//! Reads the index's recorded state.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::hasher::Fingerprint;
use crate::error::SyncError;
use crate::storage::{IndexedRecord, VectorIndex};
use crate::Result;

/// What the index knows about one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub id: String,
    /// `None` for records written without a fingerprint.
    pub fingerprint: Option<Fingerprint>,
}

/// A record that shares its source with the canonical entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub source: String,
    pub id: String,
}

/// Index state as of one read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// Canonical record per source.
    pub entries: BTreeMap<String, SnapshotEntry>,
    /// Extra records for sources that already have a canonical entry.
    pub duplicates: Vec<DuplicateRecord>,
    /// Records without a `source` payload.
    pub foreign: usize,
}

impl IndexSnapshot {
    /// Build a snapshot from payload-only records.
    ///
    /// When several records share a source, the one carrying a
    /// fingerprint wins, then the smallest id. Records without a source
    /// are counted but otherwise ignored.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = IndexedRecord>) -> Self {
        let mut snapshot = Self::default();

        for record in records {
            let Some(source) = record.source else {
                tracing::warn!(id = %record.id, "Index record has no source, ignoring");
                snapshot.foreign += 1;
                continue;
            };

            let candidate = SnapshotEntry {
                id: record.id,
                fingerprint: record.content_hash.map(Fingerprint::from_stored),
            };

            match snapshot.entries.get_mut(&source) {
                None => {
                    snapshot.entries.insert(source, candidate);
                }
                Some(existing) => {
                    let loser = if prefer(&candidate, existing) {
                        std::mem::replace(existing, candidate)
                    } else {
                        candidate
                    };
                    tracing::warn!(source = %source, id = %loser.id, "Duplicate index record");
                    snapshot.duplicates.push(DuplicateRecord {
                        source,
                        id: loser.id,
                    });
                }
            }
        }

        snapshot
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<&SnapshotEntry> {
        self.entries.get(source)
    }

    /// Number of sources with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.duplicates.is_empty()
    }
}

fn prefer(candidate: &SnapshotEntry, existing: &SnapshotEntry) -> bool {
    match (&candidate.fingerprint, &existing.fingerprint) {
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => candidate.id < existing.id,
    }
}

/// Reads the full population of the index, refusing to truncate.
#[derive(Clone)]
pub struct IndexSnapshotReader {
    index: Arc<dyn VectorIndex>,
    max_records: usize,
}

impl IndexSnapshotReader {
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, max_records: usize) -> Self {
        Self { index, max_records }
    }

    #[must_use]
    pub const fn max_records(&self) -> usize {
        self.max_records
    }

    /// Read every record in the index.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CapacityExceeded`] if the index holds more than
    /// `max_records` records, and the index error if the read fails.
    pub async fn read_all(&self) -> Result<IndexSnapshot> {
        // One extra record tells a full index apart from an oversized one.
        let records = self
            .index
            .list_all(self.max_records.saturating_add(1))
            .await?;

        if records.len() > self.max_records {
            tracing::error!(
                limit = self.max_records,
                "Index exceeds scan limit, refusing to reconcile"
            );
            return Err(SyncError::CapacityExceeded {
                limit: self.max_records,
            }
            .into());
        }

        let snapshot = IndexSnapshot::from_records(records);
        tracing::debug!(
            sources = snapshot.len(),
            duplicates = snapshot.duplicates.len(),
            foreign = snapshot.foreign,
            "Index snapshot read"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for IndexSnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshotReader")
            .field("index", &self.index.name())
            .field("max_records", &self.max_records)
            .finish()
    }
}
