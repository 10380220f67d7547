//! File system watching and change debouncing.
//!
//! This module provides:
//! - Directory watching using notify-rs
//! - Document filtering shared with the local scan
//! - A debouncer that turns bursts of changes into single sync cycles

mod debouncer;
mod events;
mod filter;
#[allow(clippy::module_inception)]
mod watcher;

pub use debouncer::{
    ChangeDebouncer, CycleOutcome, CycleRunner, DebounceMachine, DebounceState, DebouncerHandle,
    DebouncerStatus,
};
pub use events::{classify, ChangeKind, PathChange};
pub use filter::DocumentFilter;
pub use watcher::DirectoryWatcher;
