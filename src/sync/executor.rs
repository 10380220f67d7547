//! Plan execution.
//!
//! The executor is the only writer to the index. Each planned item is
//! applied independently and concurrently up to a fixed bound; a failed
//! item is reported and left for the next cycle, while an unreachable
//! index aborts the whole cycle.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::local::LocalDocument;
use super::planner::{PlannedDelete, PlannedUpdate, ReconciliationPlan};
use crate::embeddings::Embedder;
use crate::server::metrics;
use crate::storage::{DocumentRecord, VectorIndex};
use crate::{Error, Result};

/// An item that could not be applied this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub source: String,
    pub reason: String,
}

/// Counts from one executed plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Unreadable local documents left untouched.
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when every planned item was applied.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Metric label for the cycle outcome.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        if self.is_complete() {
            "success"
        } else {
            "partial"
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Inserted => self.inserted += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Deleted => self.deleted += 1,
            ItemOutcome::Failed(item) => {
                self.failed += 1;
                self.failures.push(item);
            }
        }
    }
}

enum Operation {
    Insert(LocalDocument),
    Update(PlannedUpdate),
    Delete(PlannedDelete),
}

enum ItemOutcome {
    Inserted,
    Updated,
    Deleted,
    Failed(FailedItem),
}

/// Applies reconciliation plans to the index.
#[derive(Clone)]
pub struct SyncExecutor {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    concurrency: usize,
}

impl SyncExecutor {
    #[must_use]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        concurrency: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            concurrency: concurrency.max(1),
        }
    }

    /// Apply `plan` and report what happened.
    ///
    /// # Errors
    ///
    /// Returns an error only when the index is unreachable. Per-document
    /// failures (embedding errors, rejected writes) are counted in the
    /// report instead.
    pub async fn execute(&self, plan: ReconciliationPlan) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport {
            unchanged: plan.unchanged.len(),
            skipped: plan.skipped.len(),
            ..SyncReport::default()
        };

        let operations = plan
            .to_delete
            .into_iter()
            .map(Operation::Delete)
            .chain(plan.to_update.into_iter().map(Operation::Update))
            .chain(plan.to_insert.into_iter().map(Operation::Insert));

        let outcomes: Vec<ItemOutcome> = stream::iter(operations)
            .map(|op| self.apply(op))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        for outcome in outcomes {
            report.record(outcome);
        }
        report.failures.sort_by(|a, b| a.source.cmp(&b.source));
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        metrics::record_operations("insert", report.inserted);
        metrics::record_operations("update", report.updated);
        metrics::record_operations("delete", report.deleted);
        metrics::record_operations("failed", report.failed);

        Ok(report)
    }

    async fn apply(&self, operation: Operation) -> Result<ItemOutcome> {
        match operation {
            Operation::Insert(document) => self.insert(document).await,
            Operation::Update(update) => self.update(update).await,
            Operation::Delete(delete) => self.delete(delete).await,
        }
    }

    async fn insert(&self, document: LocalDocument) -> Result<ItemOutcome> {
        let record = match self.embed(&document).await {
            Ok(record) => record,
            Err(e) => return Ok(failed(&document.source, &e)),
        };

        if let Err(e) = self.index.upsert(&record).await {
            return isolate(&document.source, e);
        }

        tracing::debug!(source = %record.source, id = %record.id, "Inserted document");
        Ok(ItemOutcome::Inserted)
    }

    /// Embed, then delete the old record, then insert the new one. The
    /// source never has two live records, and an embedding failure leaves
    /// the old record in place.
    async fn update(&self, update: PlannedUpdate) -> Result<ItemOutcome> {
        let PlannedUpdate { document, old_id } = update;

        let record = match self.embed(&document).await {
            Ok(record) => record,
            Err(e) => return Ok(failed(&document.source, &e)),
        };

        if let Err(e) = self.index.delete(&old_id).await {
            return isolate(&document.source, e);
        }

        if let Err(e) = self.index.upsert(&record).await {
            tracing::warn!(
                source = %document.source,
                old_id = %old_id,
                "Old record removed but replacement failed; next cycle will re-insert"
            );
            return isolate(&document.source, e);
        }

        tracing::debug!(
            source = %record.source,
            old_id = %old_id,
            id = %record.id,
            "Updated document"
        );
        Ok(ItemOutcome::Updated)
    }

    async fn delete(&self, delete: PlannedDelete) -> Result<ItemOutcome> {
        if let Err(e) = self.index.delete(&delete.id).await {
            return isolate(&delete.source, e);
        }

        tracing::debug!(source = %delete.source, id = %delete.id, reason = ?delete.reason, "Deleted record");
        Ok(ItemOutcome::Deleted)
    }

    async fn embed(&self, document: &LocalDocument) -> Result<DocumentRecord> {
        let embedding = self.embedder.embed(&document.content).await?;
        Ok(DocumentRecord::new(
            document.source.clone(),
            document.fingerprint.as_str(),
            document.content.clone(),
            embedding,
        ))
    }
}

impl std::fmt::Debug for SyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("index", &self.index.name())
            .field("embedder", &self.embedder.model_name())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

fn failed(source: &str, error: &Error) -> ItemOutcome {
    tracing::warn!(source, error = %error, "Document failed, will retry next cycle");
    ItemOutcome::Failed(FailedItem {
        source: source.to_string(),
        reason: error.to_string(),
    })
}

/// Index outages abort the cycle; anything else fails only this item.
fn isolate(source: &str, error: Error) -> Result<ItemOutcome> {
    if error.is_index_unavailable() {
        tracing::error!(source, error = %error, "Index unavailable, aborting cycle");
        return Err(error);
    }
    Ok(failed(source, &error))
}
