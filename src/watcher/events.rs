//! Classification of raw filesystem notifications.

#![allow(clippy::missing_const_for_fn)]

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl PathChange {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Map a notify event to the path changes it implies.
///
/// Access and metadata-only events yield nothing. A rename is a removal
/// of the old name and a creation of the new one. Overflow rescans carry
/// no paths and are handled by the watcher before classification.
#[must_use]
pub fn classify(event: Event) -> Vec<PathChange> {
    let Event { kind, paths, .. } = event;

    let kind = match kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => return classify_rename(paths, mode),
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    paths
        .into_iter()
        .map(|path| PathChange::new(path, kind))
        .collect()
}

fn classify_rename(paths: Vec<PathBuf>, mode: RenameMode) -> Vec<PathChange> {
    match mode {
        RenameMode::Both => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = paths.first() {
                changes.push(PathChange::new(from.clone(), ChangeKind::Removed));
            }
            if let Some(to) = paths.get(1) {
                changes.push(PathChange::new(to.clone(), ChangeKind::Created));
            }
            changes
        }
        RenameMode::From => paths
            .into_iter()
            .map(|p| PathChange::new(p, ChangeKind::Removed))
            .collect(),
        RenameMode::To => paths
            .into_iter()
            .map(|p| PathChange::new(p, ChangeKind::Created))
            .collect(),
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Removed
                };
                PathChange::new(p, kind)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_create_modify_remove() {
        assert_eq!(
            classify(event(EventKind::Create(CreateKind::File), &["/d/a.txt"])),
            vec![PathChange::new("/d/a.txt", ChangeKind::Created)]
        );
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/d/a.txt"]
            )),
            vec![PathChange::new("/d/a.txt", ChangeKind::Modified)]
        );
        assert_eq!(
            classify(event(EventKind::Remove(RemoveKind::File), &["/d/a.txt"])),
            vec![PathChange::new("/d/a.txt", ChangeKind::Removed)]
        );
    }

    #[test]
    fn test_ignored_kinds() {
        assert!(classify(event(EventKind::Access(AccessKind::Any), &["/d/a.txt"])).is_empty());
        assert!(classify(event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/d/a.txt"]
        ))
        .is_empty());
        assert!(classify(event(EventKind::Other, &["/d/a.txt"])).is_empty());
    }

    #[test]
    fn test_rename_both() {
        let changes = classify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/d/a.txt.tmp", "/d/a.txt"],
        ));
        assert_eq!(
            changes,
            vec![
                PathChange::new("/d/a.txt.tmp", ChangeKind::Removed),
                PathChange::new("/d/a.txt", ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_rename_halves() {
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/d/old.txt"]
            ))[0]
                .kind,
            ChangeKind::Removed
        );
        assert_eq!(
            classify(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/d/new.txt"]
            ))[0]
                .kind,
            ChangeKind::Created
        );
    }

    #[test]
    fn test_rename_any_checks_existence() {
        let changes = classify(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/definitely/not/here.txt"],
        ));
        assert_eq!(changes[0].kind, ChangeKind::Removed);
    }
}
