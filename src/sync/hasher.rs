//! Content fingerprints.

use serde::{Deserialize, Serialize};

/// BLAKE3 digest of document content, as 64 lowercase hex characters.
///
/// Local files and index payloads are fingerprinted with the same
/// function, so equal fingerprints mean equal content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw content.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(blake3::hash(content).to_hex().to_string())
    }

    /// Wrap a fingerprint read back from the index.
    ///
    /// Values that are not a 64-character hex digest (for example hashes
    /// written by another tool) are still accepted; they simply never
    /// equal a locally computed fingerprint.
    #[must_use]
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint raw content.
#[must_use]
pub fn fingerprint(content: &[u8]) -> Fingerprint {
    Fingerprint::of(content)
}
