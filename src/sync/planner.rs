//! Reconciliation planning.
//!
//! [`plan`] compares the local scan with an index snapshot and decides,
//! per source, whether to insert, update, delete or leave it alone. It
//! does no I/O.

use serde::Serialize;

use super::local::{LocalDocument, LocalScan};
use super::snapshot::IndexSnapshot;

/// A changed document and the record it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub document: LocalDocument,
    pub old_id: String,
}

/// A record to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub source: String,
    pub id: String,
    pub reason: DeleteReason,
}

/// Why a record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// The local file is gone.
    Removed,
    /// Another record already represents the source.
    Duplicate,
}

/// The work one sync cycle has to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub to_insert: Vec<LocalDocument>,
    pub to_update: Vec<PlannedUpdate>,
    pub to_delete: Vec<PlannedDelete>,
    /// Sources whose fingerprint already matches.
    pub unchanged: Vec<String>,
    /// Sources that exist locally but could not be read; left untouched.
    pub skipped: Vec<String>,
}

impl ReconciliationPlan {
    /// True when the plan mutates nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Number of index mutations the plan implies.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Compute the plan for `local` against `remote`.
///
/// Every local or remote source lands in exactly one of insert, update,
/// delete, unchanged or skipped. A source present on both sides is never
/// an insert. Duplicate records are always deleted.
#[must_use]
pub fn plan(local: &LocalScan, remote: &IndexSnapshot) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for (source, document) in &local.documents {
        match remote.get(source) {
            None => plan.to_insert.push(document.clone()),
            Some(entry) if entry.fingerprint.as_ref() == Some(&document.fingerprint) => {
                plan.unchanged.push(source.clone());
            }
            Some(entry) => plan.to_update.push(PlannedUpdate {
                document: document.clone(),
                old_id: entry.id.clone(),
            }),
        }
    }

    for (source, entry) in &remote.entries {
        if local.unreadable.contains(source) {
            plan.skipped.push(source.clone());
        } else if !local.documents.contains_key(source) {
            plan.to_delete.push(PlannedDelete {
                source: source.clone(),
                id: entry.id.clone(),
                reason: DeleteReason::Removed,
            });
        }
    }

    plan.to_delete
        .extend(remote.duplicates.iter().map(|dup| PlannedDelete {
            source: dup.source.clone(),
            id: dup.id.clone(),
            reason: DeleteReason::Duplicate,
        }));

    plan
}
