//! End-to-end tests for directory reconciliation against the embedded index.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docsync::embeddings::{Embedder, HashEmbedder};
use docsync::error::EmbeddingError;
use docsync::storage::{Distance, SqliteIndex, VectorIndex};
use docsync::sync::{fingerprint, SyncEngine, SyncOptions};
use docsync::watcher::{
    ChangeDebouncer, CycleOutcome, DebounceState, DirectoryWatcher, DocumentFilter,
};
use docsync::{Error, Result};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DIM: usize = 32;

/// Embedder that refuses texts starting with "broken" until healed.
struct RecoveringEmbedder {
    inner: HashEmbedder,
    down: AtomicBool,
}

impl RecoveringEmbedder {
    fn new() -> Self {
        Self {
            inner: HashEmbedder::new(DIM),
            down: AtomicBool::new(true),
        }
    }

    fn heal(&self) {
        self.down.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for RecoveringEmbedder {
    fn model_name(&self) -> &str {
        "recovering"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.down.load(Ordering::SeqCst) && text.starts_with("broken") {
            return Err(EmbeddingError::Unavailable("connection refused".into()).into());
        }
        self.inner.embed(text).await
    }
}

async fn index() -> Arc<SqliteIndex> {
    let index = SqliteIndex::in_memory().unwrap();
    index.ensure_schema(DIM, Distance::Cosine).await.unwrap();
    Arc::new(index)
}

fn engine(dir: &Path, index: Arc<SqliteIndex>, embedder: Arc<dyn Embedder>) -> SyncEngine {
    SyncEngine::new(
        dir,
        DocumentFilter::new(dir, &["txt".to_string()]),
        index,
        embedder,
        SyncOptions::default(),
    )
}

async fn stored_hashes(index: &SqliteIndex) -> Vec<(String, String)> {
    let mut hashes: Vec<(String, String)> = index
        .list_all(100)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.source.unwrap(), r.content_hash.unwrap()))
        .collect();
    hashes.sort();
    hashes
}

#[tokio::test]
async fn test_insert_update_delete_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let index = index().await;
    let engine = engine(tmp.path(), index.clone(), Arc::new(HashEmbedder::new(DIM)));

    // New file is inserted.
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(
        stored_hashes(&index).await,
        vec![("a.txt".to_string(), fingerprint(b"hello").to_string())]
    );

    // Nothing changed, nothing written.
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.inserted + report.updated + report.deleted, 0);

    // Edited content replaces the record under a new id.
    let old_id = index.list_all(10).await.unwrap()[0].id.clone();
    fs::write(tmp.path().join("a.txt"), "bye").unwrap();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.updated, 1);
    let records = index.list_all(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_ne!(records[0].id, old_id);
    assert_eq!(
        records[0].content_hash.as_deref(),
        Some(fingerprint(b"bye").as_str())
    );

    // Removed file drops out of the index.
    fs::remove_file(tmp.path().join("a.txt")).unwrap();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ignores_other_extensions_and_subdirectories() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "kept").unwrap();
    fs::write(tmp.path().join("notes.md"), "not a document").unwrap();
    fs::write(tmp.path().join(".hidden.txt"), "hidden").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested").join("b.txt"), "nested").unwrap();

    let index = index().await;
    let engine = engine(tmp.path(), index.clone(), Arc::new(HashEmbedder::new(DIM)));

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(
        stored_hashes(&index).await,
        vec![("a.txt".to_string(), fingerprint(b"kept").to_string())]
    );
}

#[tokio::test]
async fn test_failed_embedding_is_retried_next_cycle() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "fine").unwrap();
    fs::write(tmp.path().join("b.txt"), "broken for now").unwrap();

    let index = index().await;
    let embedder = Arc::new(RecoveringEmbedder::new());
    let engine = engine(tmp.path(), index.clone(), embedder.clone());

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());
    assert_eq!(report.failures[0].source, "b.txt");
    assert_eq!(index.count().await.unwrap(), 1);

    embedder.heal();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(index.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_cycles_converge() {
    let tmp = TempDir::new().unwrap();
    for i in 0..20 {
        fs::write(tmp.path().join(format!("doc_{i}.txt")), format!("body {i}")).unwrap();
    }

    let index = index().await;
    let engine = engine(tmp.path(), index.clone(), Arc::new(HashEmbedder::new(DIM)));

    let first = engine.run_cycle().await.unwrap();
    assert_eq!(first.inserted, 20);

    let second = engine.run_cycle().await.unwrap();
    assert_eq!(second.unchanged, 20);
    assert_eq!(second.inserted + second.updated + second.deleted, 0);
    assert_eq!(index.count().await.unwrap(), 20);
}

#[tokio::test]
async fn test_missing_directory_never_clears_index() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("a.txt"), "hello").unwrap();

    let index = index().await;
    let engine = engine(&docs, index.clone(), Arc::new(HashEmbedder::new(DIM)));
    engine.run_cycle().await.unwrap();

    fs::remove_dir_all(&docs).unwrap();
    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_debounced_burst_runs_single_cycle() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();

    let index = index().await;
    let engine = Arc::new(engine(
        tmp.path(),
        index.clone(),
        Arc::new(HashEmbedder::new(DIM)),
    ));

    let cancel = CancellationToken::new();
    let debouncer =
        ChangeDebouncer::spawn(engine.clone(), Duration::from_millis(50), cancel.clone());
    let mut outcomes = debouncer.subscribe();

    for _ in 0..10 {
        assert!(debouncer.notify());
    }

    let outcome = tokio::time::timeout(Duration::from_secs(10), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed { ref report } if report.inserted == 1));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = debouncer.status();
    assert_eq!(status.cycles_completed, 1);
    assert_eq!(status.state, DebounceState::Idle);
    assert_eq!(engine.cycles(), 1);

    cancel.cancel();
    debouncer.join().await;
}

#[tokio::test]
async fn test_watcher_picks_up_new_file() {
    let tmp = TempDir::new().unwrap();
    let index = index().await;
    let engine = Arc::new(engine(
        tmp.path(),
        index.clone(),
        Arc::new(HashEmbedder::new(DIM)),
    ));
    engine.run_cycle().await.unwrap();

    let cancel = CancellationToken::new();
    let debouncer =
        ChangeDebouncer::spawn(engine.clone(), Duration::from_millis(100), cancel.clone());
    let mut outcomes = debouncer.subscribe();
    let _watcher = DirectoryWatcher::start(engine.filter().clone(), debouncer.clone()).unwrap();

    fs::write(tmp.path().join("fresh.txt"), "just arrived").unwrap();

    let indexed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match outcomes.recv().await {
                Ok(CycleOutcome::Completed { report }) if report.inserted == 1 => break,
                Ok(_) => {}
                Err(e) => panic!("outcome stream closed: {e}"),
            }
        }
    })
    .await;
    assert!(indexed.is_ok(), "new file was not indexed in time");
    assert_eq!(index.count().await.unwrap(), 1);

    cancel.cancel();
    debouncer.join().await;
}
