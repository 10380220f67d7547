//! `SQLite` handle for the embedded index.
//!
//! In-memory databases skip WAL since it has no effect there.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::error::StorageError;
use crate::Result;

const IN_MEMORY: &str = ":memory:";

/// Shared `SQLite` connection. Clones refer to the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
}

impl Database {
    /// Open or create the index file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be opened or the
    /// pragmas cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            StorageError::Database(format!("failed to open {}: {e}", path.display()))
        })?;

        Self::prepare(conn, &path.to_string_lossy(), true)
    }

    /// Open a private in-memory index.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Database(format!("failed to open in-memory database: {e}"))
        })?;
        Self::prepare(conn, IN_MEMORY, false)
    }

    fn prepare(conn: Connection, location: &str, wal: bool) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| StorageError::Database(format!("failed to set busy timeout: {e}")))?;

        let pragmas = if wal {
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA temp_store = MEMORY;"
        } else {
            "PRAGMA temp_store = MEMORY;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| StorageError::Database(format!("failed to configure {location}: {e}")))?;

        tracing::debug!(location, wal, "Opened index database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(location),
        })
    }

    /// Run `f` while holding the connection lock.
    ///
    /// # Errors
    ///
    /// Propagates whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// File path, or `:memory:`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        (&*self.location != IN_MEMORY).then(|| PathBuf::from(&*self.location))
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the connection is unusable.
    pub fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StorageError::Database(format!("health check failed: {e}")).into())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
