//! Reconciliation of the document directory against the vector index.
//!
//! A cycle runs in four steps:
//! 1. [`scan_documents`] lists and fingerprints local documents
//! 2. [`IndexSnapshotReader`] reads what the index recorded
//! 3. [`plan`] decides inserts, updates and deletes (pure)
//! 4. [`SyncExecutor`] applies the plan, the index's only writer
//!
//! [`SyncEngine`] strings these together under a timeout.

mod engine;
mod executor;
mod hasher;
mod local;
mod planner;
mod snapshot;

pub use engine::{SyncEngine, SyncOptions};
pub use executor::{FailedItem, SyncExecutor, SyncReport};
pub use hasher::{fingerprint, Fingerprint};
pub use local::{scan_documents, scan_documents_async, LocalDocument, LocalScan};
pub use planner::{plan, DeleteReason, PlannedDelete, PlannedUpdate, ReconciliationPlan};
pub use snapshot::{DuplicateRecord, IndexSnapshot, IndexSnapshotReader, SnapshotEntry};
