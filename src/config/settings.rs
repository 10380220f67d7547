//! Configuration settings and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Where the vector index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexBackend {
    /// Remote Qdrant collection.
    Qdrant,
    /// Embedded `SQLite` file under `data_dir`.
    Sqlite,
}

/// Which embedding collaborator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Deterministic offline vectors derived from a content hash.
    Hash,
}

/// Main configuration for docsync.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of documents to keep in sync.
    pub docs_dir: PathBuf,

    /// Recognised document extensions, without the dot.
    pub extensions: Vec<String>,

    /// Extra gitignore-style patterns excluded from the document set.
    pub ignore_patterns: Vec<String>,

    /// Index backend.
    pub index_backend: IndexBackend,

    /// Vector store host.
    pub index_host: String,

    /// Vector store HTTP port.
    pub index_port: u16,

    /// Collection holding the documents.
    pub collection: String,

    /// Directory for the embedded index backend.
    pub data_dir: PathBuf,

    /// Upper bound on records read in one snapshot.
    pub max_scan: usize,

    /// Quiet period after the last change before a sync cycle starts.
    pub debounce: Duration,

    /// Hard limit on one sync cycle.
    pub sync_timeout: Duration,

    /// Documents processed concurrently within a cycle.
    pub sync_concurrency: usize,

    /// Embedding collaborator.
    pub embedding_provider: EmbeddingProvider,

    /// Base URL of the embedding endpoint.
    pub embedding_url: String,

    /// Embedding model name.
    pub embedding_model: String,

    /// Embedding vector dimension.
    pub embedding_dims: usize,

    /// Optional bearer token for the embedding endpoint.
    pub embedding_api_key: Option<String>,

    /// Base URL of the chat completion endpoint.
    pub llm_url: String,

    /// Chat model name.
    pub llm_model: String,

    /// Bearer token for the chat completion endpoint.
    pub llm_api_key: Option<String>,

    /// Documents retrieved per question.
    pub top_k: usize,

    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("./example_docs"),
            extensions: vec!["txt".to_string()],
            ignore_patterns: Vec::new(),
            index_backend: IndexBackend::Qdrant,
            index_host: "localhost".to_string(),
            index_port: 6333,
            collection: "docs".to_string(),
            data_dir: PathBuf::from("./data"),
            max_scan: 10_000,
            debounce: Duration::from_secs(1),
            sync_timeout: Duration::from_secs(300),
            sync_concurrency: 4,
            embedding_provider: EmbeddingProvider::Openai,
            embedding_url: "http://localhost:8081/v1".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dims: crate::embeddings::DEFAULT_EMBEDDING_DIM,
            embedding_api_key: None,
            llm_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model: "llama-3.3-70b-versatile".to_string(),
            llm_api_key: None,
            top_k: 3,
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port cannot be 0"));
        }

        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.extensions.is_empty() {
            return Err(Error::config("at least one document extension is required"));
        }

        // A leading dot is allowed and stripped by the document filter.
        if self
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.'))
            .any(|e| e.is_empty() || e.contains('.'))
        {
            return Err(Error::config(
                "extensions must be single names such as 'txt' or '.txt'",
            ));
        }

        if self.index_backend == IndexBackend::Qdrant {
            if self.index_host.is_empty() {
                return Err(Error::config("index_host cannot be empty"));
            }
            if self.index_port == 0 {
                return Err(Error::config("index_port cannot be 0"));
            }
        }

        if self.collection.is_empty() {
            return Err(Error::config("collection cannot be empty"));
        }

        if self.max_scan == 0 {
            return Err(Error::config("max_scan cannot be 0"));
        }

        if self.debounce.is_zero() {
            return Err(Error::config("debounce window cannot be 0"));
        }

        if self.sync_timeout.is_zero() {
            return Err(Error::config("sync_timeout cannot be 0"));
        }

        if self.sync_concurrency == 0 {
            return Err(Error::config("sync_concurrency cannot be 0"));
        }

        if self.sync_concurrency > 64 {
            return Err(Error::config("sync_concurrency cannot exceed 64"));
        }

        if self.embedding_dims == 0 {
            return Err(Error::config("embedding_dims cannot be 0"));
        }

        if self.top_k == 0 {
            return Err(Error::config("top_k cannot be 0"));
        }

        Ok(())
    }

    /// Check that the document directory exists and is a directory.
    ///
    /// A missing directory is never treated as an empty document set,
    /// since reconciling against it would delete every indexed record.
    ///
    /// # Errors
    ///
    /// Returns a configuration error otherwise.
    pub fn verify_docs_dir(&self) -> Result<()> {
        verify_directory(&self.docs_dir)
    }

    /// Base URL of the Qdrant HTTP API.
    #[must_use]
    pub fn index_url(&self) -> String {
        format!("http://{}:{}", self.index_host, self.index_port)
    }

    /// Get the path to the embedded index file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.collection))
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn verify_directory(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::config(format!(
            "document directory '{}' is not accessible: {e}",
            path.display()
        ))
    })?;

    if !metadata.is_dir() {
        return Err(Error::config(format!(
            "document path '{}' is not a directory",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.debounce, Duration::from_secs(1));
        assert_eq!(config.max_scan, 10_000);
        assert_eq!(config.extensions, vec!["txt".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_validate_extensions() {
        let config = Config {
            extensions: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            extensions: vec![".txt".to_string(), "MD".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        for bad in [".", "", "tar.gz"] {
            let config = Config {
                extensions: vec![bad.to_string()],
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("single names"), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_validate_zero_limits() {
        let zero_scan = Config {
            max_scan: 0,
            ..Default::default()
        };
        assert!(zero_scan.validate().unwrap_err().to_string().contains("max_scan"));

        let zero_debounce = Config {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_debounce
            .validate()
            .unwrap_err()
            .to_string()
            .contains("debounce"));

        let zero_concurrency = Config {
            sync_concurrency: 0,
            ..Default::default()
        };
        assert!(zero_concurrency.validate().is_err());

        let zero_dims = Config {
            embedding_dims: 0,
            ..Default::default()
        };
        assert!(zero_dims.validate().is_err());
    }

    #[test]
    fn test_sqlite_backend_ignores_index_host() {
        let config = Config {
            index_backend: IndexBackend::Sqlite,
            index_host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_verify_docs_dir() {
        let tmp = TempDir::new().unwrap();

        let ok = Config {
            docs_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(ok.verify_docs_dir().is_ok());

        let missing = Config {
            docs_dir: tmp.path().join("missing"),
            ..Default::default()
        };
        let err = missing.verify_docs_dir().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let not_dir = Config {
            docs_dir: file,
            ..Default::default()
        };
        assert!(not_dir
            .verify_docs_dir()
            .unwrap_err()
            .to_string()
            .contains("not a directory"));
    }

    #[test]
    fn test_index_url_and_paths() {
        let config = Config {
            index_host: "qdrant".to_string(),
            index_port: 6334,
            data_dir: PathBuf::from("/var/lib/docsync"),
            ..Default::default()
        };
        assert_eq!(config.index_url(), "http://qdrant:6334");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/docsync/docs.db")
        );
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "0.0.0.0:9090");
    }
}
