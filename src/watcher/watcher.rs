//! File system watcher using notify-rs.

use std::path::{Path, PathBuf};

use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};

use super::debouncer::DebouncerHandle;
use super::events::{classify, PathChange};
use super::filter::DocumentFilter;
use crate::error::WatcherError;
use crate::server::metrics;
use crate::Result;

/// Watches the document directory and signals the debouncer.
///
/// Each document create, modify or remove event becomes one signal.
/// Deduplication is left to the debouncer and to fingerprinting.
/// Dropping the watcher stops notifications.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `filter.base_path()` (non-recursively).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or cannot be
    /// watched.
    pub fn start(filter: DocumentFilter, debouncer: DebouncerHandle) -> Result<Self> {
        let path = filter.base_path().to_path_buf();

        if !path.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| {
                handle_event(&filter, &debouncer, result);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "Watching directory");

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    /// Directory being watched.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Route one notification. Returns the number of signals sent.
///
/// A rescan flag means the kernel queue overflowed and events were lost,
/// and a watch error may hide a change too. Both queue a full cycle
/// without consulting the filter.
fn handle_event(
    filter: &DocumentFilter,
    debouncer: &DebouncerHandle,
    result: notify::Result<notify::Event>,
) -> usize {
    match result {
        Ok(event) if event.need_rescan() => {
            tracing::warn!("Watch queue overflowed, scheduling full sync");
            rescan(debouncer)
        }
        Ok(event) => classify(event)
            .iter()
            .map(|change| usize::from(forward(filter, debouncer, change)))
            .sum(),
        Err(e) => {
            tracing::error!(error = %e, "Watch error, scheduling full sync");
            rescan(debouncer)
        }
    }
}

fn rescan(debouncer: &DebouncerHandle) -> usize {
    metrics::CHANGE_EVENTS.inc();
    if debouncer.notify() {
        1
    } else {
        tracing::warn!("Debouncer stopped, dropping rescan");
        0
    }
}

/// Pass a document change to the debouncer. Returns whether it counted.
fn forward(filter: &DocumentFilter, debouncer: &DebouncerHandle, change: &PathChange) -> bool {
    if !filter.is_document(&change.path) {
        return false;
    }

    tracing::debug!(path = %change.path.display(), kind = ?change.kind, "Document changed");
    metrics::CHANGE_EVENTS.inc();

    if !debouncer.notify() {
        tracing::warn!("Debouncer stopped, dropping change");
    }
    true
}
