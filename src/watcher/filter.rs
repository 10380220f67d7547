//! Document filtering with gitignore-style patterns.
//!
//! The same filter decides which watcher events count as changes and
//! which files the local scan reads, so both agree on the document set.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::Result;

/// Files that are never documents.
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Decides whether a path in the document directory is a document.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    extensions: Vec<String>,
    gitignore: Option<Gitignore>,
    base_path: PathBuf,
}

impl DocumentFilter {
    /// Create a filter accepting the given extensions (without dots).
    ///
    /// If a `.gitignore` exists in `base_path`, it is used as well.
    pub fn new(base_path: impl AsRef<Path>, extensions: &[String]) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        let gitignore_path = base_path.join(".gitignore");

        let gitignore = if gitignore_path.exists() {
            let mut builder = GitignoreBuilder::new(&base_path);
            if builder.add(&gitignore_path).is_none() {
                builder.build().ok()
            } else {
                None
            }
        } else {
            None
        };

        Self {
            extensions: normalize(extensions),
            gitignore,
            base_path,
        }
    }

    /// Create a filter with custom ignore patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(
        base_path: impl AsRef<Path>,
        extensions: &[String],
        patterns: &[String],
    ) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if patterns.is_empty() {
            return Ok(Self::new(base_path, extensions));
        }

        let mut builder = GitignoreBuilder::new(&base_path);
        let gitignore_path = base_path.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                tracing::warn!(error = %e, "Ignoring unreadable .gitignore");
            }
        }

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid pattern '{pattern}': {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build ignore rules: {e}")))?;

        Ok(Self {
            extensions: normalize(extensions),
            gitignore: Some(gitignore),
            base_path,
        })
    }

    /// Directory the filter is rooted at.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Check if a path names a document.
    ///
    /// Works on names only, so it also answers for paths that were just
    /// removed. Only direct children of the base directory qualify.
    #[must_use]
    pub fn is_document(&self, path: &Path) -> bool {
        if let Some(parent) = path.parent() {
            if path.is_absolute() && !same_dir(parent, &self.base_path) {
                return false;
            }
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if is_temporary(name) {
            return false;
        }

        if !self.has_document_extension(path) {
            return false;
        }

        if let Some(ref gi) = self.gitignore {
            if gi.matched(path, false).is_ignore() {
                return false;
            }
        }

        true
    }

    /// Check the extension against the recognised set (case-insensitive).
    #[must_use]
    pub fn has_document_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }
}

fn normalize(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}

/// Hidden files, editor backups and swap files.
fn is_temporary(name: &str) -> bool {
    IGNORED_FILES.contains(&name)
        || name.starts_with('.')
        || name.ends_with('~')
        || name.starts_with(".#")
        || name.ends_with(".swp")
        || name.ends_with(".tmp")
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn txt() -> Vec<String> {
        vec!["txt".to_string()]
    }

    #[test]
    fn test_extension_case_insensitive() {
        let filter = DocumentFilter::new("/docs", &txt());
        assert!(filter.has_document_extension(Path::new("a.txt")));
        assert!(filter.has_document_extension(Path::new("A.TXT")));
        assert!(!filter.has_document_extension(Path::new("a.md")));
        assert!(!filter.has_document_extension(Path::new("txt")));
    }

    #[test]
    fn test_leading_dot_in_extension_is_accepted() {
        let filter = DocumentFilter::new("/docs", &[".md".to_string()]);
        assert!(filter.has_document_extension(Path::new("notes.md")));
    }

    #[test]
    fn test_temporaries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let filter = DocumentFilter::new(tmp.path(), &txt());

        assert!(filter.is_document(&tmp.path().join("a.txt")));
        assert!(!filter.is_document(&tmp.path().join(".hidden.txt")));
        assert!(!filter.is_document(&tmp.path().join("a.txt~")));
        assert!(!filter.is_document(&tmp.path().join(".a.txt.swp")));
        assert!(!filter.is_document(&tmp.path().join(".#a.txt")));
    }

    #[test]
    fn test_removed_file_still_matches() {
        let tmp = TempDir::new().unwrap();
        let filter = DocumentFilter::new(tmp.path(), &txt());
        // Never created: deletion events carry paths that no longer exist.
        assert!(filter.is_document(&tmp.path().join("gone.txt")));
    }

    #[test]
    fn test_subdirectory_is_not_document() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        let filter = DocumentFilter::new(tmp.path(), &txt());
        assert!(!filter.is_document(&tmp.path().join("nested").join("a.txt")));
    }

    #[test]
    fn test_filter_with_gitignore() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "draft-*.txt\n").unwrap();

        let filter = DocumentFilter::new(tmp.path(), &txt());

        assert!(filter.is_document(&tmp.path().join("final.txt")));
        assert!(!filter.is_document(&tmp.path().join("draft-1.txt")));
    }

    #[test]
    fn test_filter_with_patterns() {
        let tmp = TempDir::new().unwrap();
        let filter =
            DocumentFilter::with_patterns(tmp.path(), &txt(), &["scratch*.txt".to_string()])
                .unwrap();

        assert!(filter.is_document(&tmp.path().join("main.txt")));
        assert!(!filter.is_document(&tmp.path().join("scratch.txt")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = DocumentFilter::with_patterns(tmp.path(), &txt(), &["a{".to_string()])
            .unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("a{"));
    }
}
