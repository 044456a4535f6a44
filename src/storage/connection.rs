//! Database connection management with WAL mode support.
//!
//! A single-writer SQLite store: local (WAL) or cloud-safe (DELETE journal)
//! operation, selected by [`StorageMode`].

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;

/// Journal mode for the underlying SQLite file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// WAL journal: best performance, unsafe on cloud-synced folders.
    Local,
    /// DELETE journal: safe for Dropbox/OneDrive/iCloud-synced folders.
    CloudSafe,
}

/// Resolved configuration for opening a [`Storage`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    pub storage_mode: StorageMode,
}

impl StorageConfig {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            storage_mode: StorageMode::Local,
        }
    }
}

/// Storage engine wrapping SQLite. `Clone` shares the underlying connection
/// so callers can pass a `Storage` across threads while the mutex enforces
/// single-writer semantics (`spec.md` §5).
pub struct Storage {
    config: StorageConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Opens or creates a database with the given configuration, running
    /// migrations to the latest schema version.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        run_migrations(&conn)?;
        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (tests, `validate`/`parse` CLI dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig::in_memory())
    }

    fn create_connection(config: &StorageConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)?
        };

        Self::configure_pragmas(&conn, config.storage_mode)?;
        Ok(conn)
    }

    fn configure_pragmas(conn: &Connection, mode: StorageMode) -> Result<()> {
        match mode {
            StorageMode::Local => {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA wal_autocheckpoint=1000;
                    PRAGMA busy_timeout=30000;
                    PRAGMA cache_size=-64000;
                    PRAGMA temp_store=MEMORY;
                    PRAGMA foreign_keys=ON;
                    "#,
                )?;
            }
            StorageMode::CloudSafe => {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=DELETE;
                    PRAGMA synchronous=FULL;
                    PRAGMA busy_timeout=30000;
                    PRAGMA cache_size=-32000;
                    PRAGMA temp_store=MEMORY;
                    PRAGMA foreign_keys=ON;
                    "#,
                )?;
            }
        }
        Ok(())
    }

    /// Runs `f` with a plain connection reference (readers, or writers that
    /// manage their own transaction boundaries).
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Runs `f` inside a transaction; commits on `Ok`, rolls back on `Err`
    /// (`spec.md` §4.8's `store_file`/`delete_file` atomicity guarantee).
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    #[must_use]
    pub fn storage_mode(&self) -> StorageMode {
        self.config.storage_mode
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    /// Best-effort heuristic: true when the db path sits inside a
    /// cloud-synced folder, where WAL mode risks corruption.
    #[must_use]
    pub fn is_in_cloud_folder(&self) -> bool {
        let path = self.config.db_path.to_lowercase();
        path.contains("dropbox")
            || path.contains("onedrive")
            || path.contains("icloud")
            || path.contains("google drive")
    }

    #[must_use]
    pub fn storage_mode_warning(&self) -> Option<String> {
        if self.is_in_cloud_folder() && self.config.storage_mode == StorageMode::Local {
            Some(format!(
                "database '{}' appears to be in a cloud-synced folder; WAL mode may cause \
                 corruption there, consider StorageMode::CloudSafe",
                self.config.db_path
            ))
        } else {
            None
        }
    }

    /// Database size in bytes, for `status`/`backup` reporting.
    pub fn db_size(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let size: i64 = conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )?;
        Ok(size)
    }

    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
    }

    #[test]
    fn cloud_folder_heuristic() {
        let config = StorageConfig {
            db_path: "/Users/t/Dropbox/skillsplit.db".to_string(),
            storage_mode: StorageMode::Local,
        };
        assert!(config.db_path.to_lowercase().contains("dropbox"));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        let result: Result<()> = storage.with_transaction(|conn| {
            conn.execute_batch("CREATE TABLE t(x)")?;
            Err(crate::error::Error::NotFound("boom".to_string()))
        });
        assert!(result.is_err());
        let exists: bool = storage
            .with_connection(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type='table' AND name='t'",
                        [],
                        |_| Ok(true),
                    )
                    .unwrap_or(false))
            })
            .unwrap();
        assert!(!exists);
    }
}
