//! One reconciliation cycle: scan, read snapshot, plan, execute.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::Instrument;

use super::executor::{SyncExecutor, SyncReport};
use super::local::scan_documents_async;
use super::planner::plan;
use super::snapshot::IndexSnapshotReader;
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::error::SyncError;
use crate::server::{metrics, spans};
use crate::storage::VectorIndex;
use crate::watcher::{CycleRunner, DocumentFilter};
use crate::Result;

/// Tunables for [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_scan: usize,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_scan: 10_000,
            timeout: Duration::from_secs(300),
            concurrency: 4,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_scan: config.max_scan,
            timeout: config.sync_timeout,
            concurrency: config.sync_concurrency,
        }
    }
}

/// Keeps the index in step with the document directory.
pub struct SyncEngine {
    docs_dir: PathBuf,
    filter: DocumentFilter,
    index: Arc<dyn VectorIndex>,
    reader: IndexSnapshotReader,
    executor: SyncExecutor,
    timeout: Duration,
    cycles: AtomicU64,
    last_report: RwLock<Option<SyncReport>>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        docs_dir: impl Into<PathBuf>,
        filter: DocumentFilter,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        options: SyncOptions,
    ) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            filter,
            reader: IndexSnapshotReader::new(Arc::clone(&index), options.max_scan),
            executor: SyncExecutor::new(Arc::clone(&index), embedder, options.concurrency),
            index,
            timeout: options.timeout,
            cycles: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    /// Build an engine from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the ignore patterns are invalid.
    pub fn from_config(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let filter = DocumentFilter::with_patterns(
            &config.docs_dir,
            &config.extensions,
            &config.ignore_patterns,
        )?;
        Ok(Self::new(
            config.docs_dir.clone(),
            filter,
            index,
            embedder,
            SyncOptions::from(config),
        ))
    }

    #[must_use]
    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    #[must_use]
    pub fn filter(&self) -> &DocumentFilter {
        &self.filter
    }

    /// Cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Report of the last cycle that finished.
    #[must_use]
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    /// Run one full cycle under the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the directory cannot be read,
    /// [`SyncError::CapacityExceeded`] for an oversized index,
    /// [`SyncError::Timeout`] on expiry, and the index error when the
    /// index is unreachable. Nothing is written before the scan and the
    /// snapshot read have both succeeded.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        async {
            let start = Instant::now();
            let result = match tokio::time::timeout(self.timeout, self.reconcile()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout {
                    after: self.timeout,
                }
                .into()),
            };
            metrics::SYNC_DURATION.observe(start.elapsed().as_secs_f64());

            self.record_outcome(&result);
            self.refresh_document_count().await;
            result
        }
        .instrument(spans::sync_cycle_span(cycle))
        .await
    }

    fn record_outcome(&self, result: &Result<SyncReport>) {
        match result {
            Ok(report) => {
                metrics::SYNC_CYCLES
                    .with_label_values(&[report.outcome()])
                    .inc();
                tracing::info!(
                    inserted = report.inserted,
                    updated = report.updated,
                    deleted = report.deleted,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    duration_ms = report.duration_ms,
                    "Sync cycle complete"
                );
                *self.last_report.write() = Some(report.clone());
            }
            Err(e) => {
                let outcome = if matches!(e, crate::Error::Sync(SyncError::Timeout { .. })) {
                    "timeout"
                } else {
                    "failed"
                };
                metrics::SYNC_CYCLES.with_label_values(&[outcome]).inc();
                tracing::error!(error = %e, transient = e.is_transient(), "Sync cycle failed");
            }
        }
    }

    async fn refresh_document_count(&self) {
        match self.index.count().await {
            Ok(count) => metrics::DOCUMENTS_TOTAL.set(i64::try_from(count).unwrap_or(i64::MAX)),
            Err(e) => tracing::debug!(error = %e, "Could not refresh document count"),
        }
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        let local = scan_documents_async(&self.docs_dir, &self.filter).await?;
        let snapshot = self.reader.read_all().await?;
        let plan = plan(&local, &snapshot);

        tracing::debug!(
            insert = plan.to_insert.len(),
            update = plan.to_update.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            skipped = plan.skipped.len(),
            "Reconciliation planned"
        );

        self.executor.execute(plan).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("docs_dir", &self.docs_dir)
            .field("reader", &self.reader)
            .field("executor", &self.executor)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CycleRunner for SyncEngine {
    async fn run_cycle(&self) -> Result<SyncReport> {
        Self::run_cycle(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::storage::{
        Distance, DocumentRecord, IndexedRecord, ScoredDocument, SqliteIndex,
    };
    use crate::sync::hasher::fingerprint;
    use crate::Error;
    use std::fs;
    use tempfile::TempDir;

    const DIM: usize = 16;

    async fn engine(dir: &Path, options: SyncOptions) -> (SyncEngine, Arc<SqliteIndex>) {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_schema(DIM, Distance::Cosine).await.unwrap();
        let index = Arc::new(index);
        let engine = SyncEngine::new(
            dir,
            DocumentFilter::new(dir, &["txt".to_string()]),
            index.clone(),
            Arc::new(HashEmbedder::new(DIM)),
            options,
        );
        (engine, index)
    }

    #[tokio::test]
    async fn test_cycle_reconciles_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        let (engine, index) = engine(tmp.path(), SyncOptions::default()).await;

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(engine.cycles(), 1);
        assert_eq!(engine.last_report(), Some(report));

        let second = engine.run_cycle().await.unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.inserted + second.updated + second.deleted, 0);

        fs::write(tmp.path().join("a.txt"), "bye").unwrap();
        let third = engine.run_cycle().await.unwrap();
        assert_eq!(third.updated, 1);

        let records = index.list_all(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].content_hash.as_deref(),
            Some(fingerprint(b"bye").as_str())
        );
    }

    #[tokio::test]
    async fn test_missing_directory_deletes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "hello").unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("a.txt"), "hello").unwrap();

        let (engine, index) = engine(&docs, SyncOptions::default()).await;
        engine.run_cycle().await.unwrap();

        fs::remove_dir_all(&docs).unwrap();
        let err = engine.run_cycle().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_applies_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("new.txt"), "new").unwrap();
        let (engine, index) = engine(
            tmp.path(),
            SyncOptions {
                max_scan: 1,
                ..SyncOptions::default()
            },
        )
        .await;

        for (source, text) in [("x.txt", "x"), ("y.txt", "y")] {
            let record = DocumentRecord::new(
                source,
                fingerprint(text.as_bytes()).as_str(),
                text,
                crate::embeddings::hash_embedding(text, DIM),
            );
            index.upsert(&record).await.unwrap();
        }

        let err = engine.run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Sync(SyncError::CapacityExceeded { limit: 1 })
        ));
        assert_eq!(index.count().await.unwrap(), 2);
    }

    /// Index that never answers `list_all`.
    struct StallingIndex;

    #[async_trait]
    impl VectorIndex for StallingIndex {
        fn name(&self) -> &'static str {
            "stalling"
        }
        async fn ensure_schema(&self, _: usize, _: Distance) -> Result<()> {
            Ok(())
        }
        async fn list_all(&self, _: usize) -> Result<Vec<IndexedRecord>> {
            std::future::pending().await
        }
        async fn upsert(&self, _: &DocumentRecord) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _: &[f32], _: usize) -> Result<Vec<ScoredDocument>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_timeout_is_recoverable_error() {
        let tmp = TempDir::new().unwrap();
        let engine = SyncEngine::new(
            tmp.path(),
            DocumentFilter::new(tmp.path(), &["txt".to_string()]),
            Arc::new(StallingIndex),
            Arc::new(HashEmbedder::new(DIM)),
            SyncOptions {
                timeout: Duration::from_secs(5),
                ..SyncOptions::default()
            },
        );

        let err = engine.run_cycle().await.unwrap_err();
        assert!(matches!(err, Error::Sync(SyncError::Timeout { .. })));
        assert!(err.is_transient());
        assert!(engine.last_report().is_none());
    }
}
