//! Local document scan.
//!
//! Lists the direct children of the document directory, reads each
//! document and fingerprints it. Subdirectories are not descended into.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use walkdir::WalkDir;

use super::hasher::Fingerprint;
use crate::watcher::DocumentFilter;
use crate::{Error, Result};

/// A document as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    /// File name, the identity key.
    pub source: String,
    pub content: String,
    pub fingerprint: Fingerprint,
}

impl LocalDocument {
    #[must_use]
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            source: source.into(),
            fingerprint: Fingerprint::of(content.as_bytes()),
            content,
        }
    }
}

/// Result of scanning the document directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalScan {
    /// Readable documents by source.
    pub documents: BTreeMap<String, LocalDocument>,
    /// Documents that exist but could not be read this time.
    pub unreadable: BTreeSet<String>,
}

impl LocalScan {
    /// Build a scan from documents (all readable).
    #[must_use]
    pub fn from_documents(documents: impl IntoIterator<Item = LocalDocument>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|d| (d.source.clone(), d))
                .collect(),
            unreadable: BTreeSet::new(),
        }
    }

    /// Whether `source` exists locally, readable or not.
    #[must_use]
    pub fn contains(&self, source: &str) -> bool {
        self.documents.contains_key(source) || self.unreadable.contains(source)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.unreadable.is_empty()
    }
}

/// Scan `dir` for documents accepted by `filter`.
///
/// # Errors
///
/// Returns a configuration error if the directory is missing or cannot be
/// listed. An unreadable directory is never reported as an empty one.
pub fn scan_documents(dir: &Path, filter: &DocumentFilter) -> Result<LocalScan> {
    let metadata = std::fs::metadata(dir).map_err(|e| {
        Error::config(format!(
            "document directory '{}' is not accessible: {e}",
            dir.display()
        ))
    })?;
    if !metadata.is_dir() {
        return Err(Error::config(format!(
            "document path '{}' is not a directory",
            dir.display()
        )));
    }

    let mut scan = LocalScan::default();

    // Symlinked documents count; at depth 1 a linked directory is still skipped.
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(Error::config(format!(
                    "document directory '{}' cannot be listed: {e}",
                    dir.display()
                )));
            }
            Err(e) => {
                // A dangling link still names a document; keep its record.
                if let Some(source) = e
                    .path()
                    .filter(|p| filter.is_document(p))
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                {
                    tracing::warn!(source, error = %e, "Document unreadable, leaving index entry untouched");
                    scan.unreadable.insert(source.to_string());
                } else {
                    tracing::warn!(error = %e, "Error listing document directory entry");
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !filter.is_document(path) {
            continue;
        }

        let Some(source) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping document with non UTF-8 name");
            continue;
        };

        match std::fs::read_to_string(path) {
            Ok(content) => {
                scan.documents
                    .insert(source.to_string(), LocalDocument::new(source, content));
            }
            Err(e) => {
                tracing::warn!(source, error = %e, "Document unreadable, leaving index entry untouched");
                scan.unreadable.insert(source.to_string());
            }
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        documents = scan.documents.len(),
        unreadable = scan.unreadable.len(),
        "Local scan complete"
    );

    Ok(scan)
}

/// Run [`scan_documents`] on the blocking pool.
///
/// # Errors
///
/// Same as [`scan_documents`], plus an internal error if the task panics.
pub async fn scan_documents_async(dir: &Path, filter: &DocumentFilter) -> Result<LocalScan> {
    let dir = dir.to_path_buf();
    let filter = filter.clone();

    tokio::task::spawn_blocking(move || scan_documents(&dir, &filter))
        .await
        .map_err(|e| Error::internal(format!("scan task failed: {e}")))?
}
