//! Shared SQLite handle for one backing file.

use crate::config::StoreConfig;
use crate::error::{BrainError, Result};
use rusqlite::Connection;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::debug;

/// A cloneable handle to one brain backing file.
///
/// Every logical collection of a brain lives in its own table inside the
/// same file and shares this connection. Writes are serialized through the
/// internal mutex; WAL journaling keeps each committed write durable without
/// a full sync per transaction.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

/// Size and modification time of the backing file and its WAL companion.
///
/// Two fingerprints differ whenever a write has landed in either file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFingerprint {
    pub db_len: u64,
    pub db_modified: Option<SystemTime>,
    pub wal_len: u64,
    pub wal_modified: Option<SystemTime>,
}

impl Database {
    /// Open (or create) the backing file at `path`.
    ///
    /// An empty path is a configuration error: no store can exist without one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(BrainError::Config {
                message: "Backing store path must not be empty".to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| BrainError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| BrainError::Database {
            message: format!("Failed to open brain database: {}", e),
            source: Some(e),
        })?;
        Self::configure_connection(&conn)?;

        debug!("Opened brain database at {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// WAL journaling with NORMAL sync bounds crash corruption while keeping
    /// per-record transactions cheap.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA temp_store=MEMORY;",
            StoreConfig::BUSY_TIMEOUT.as_millis(),
        ))
        .map_err(|e| BrainError::Database {
            message: format!("Failed to set pragmas: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the write-ahead log next to the backing file.
    pub fn wal_path(&self) -> PathBuf {
        let mut wal: OsString = self.path.as_os_str().to_owned();
        wal.push("-wal");
        PathBuf::from(wal)
    }

    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BrainError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Fold the WAL back into the main file.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        // wal_checkpoint returns a status row, so it has to be read as a query.
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("Checkpointed WAL");
        Ok(())
    }

    /// Current size/mtime of the backing file and its WAL.
    ///
    /// Missing files read as zero length with no mtime.
    pub fn fingerprint(&self) -> FileFingerprint {
        let (db_len, db_modified) = stat(&self.path);
        let (wal_len, wal_modified) = stat(&self.wal_path());
        FileFingerprint {
            db_len,
            db_modified,
            wal_len,
            wal_modified,
        }
    }
}

fn stat(path: &Path) -> (u64, Option<SystemTime>) {
    match std::fs::metadata(path) {
        Ok(meta) => (meta.len(), meta.modified().ok()),
        Err(_) => (0, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_path_is_config_error() {
        let result = Database::open("");
        assert!(matches!(result, Err(BrainError::Config { .. })));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("brain.sqlite");
        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("brain.sqlite")).unwrap();
        let conn = db.lock_conn().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_fingerprint_changes_after_write() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("brain.sqlite")).unwrap();
        let before = db.fingerprint();

        {
            let conn = db.lock_conn().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }

        assert_ne!(db.fingerprint(), before);
    }

    #[test]
    fn test_checkpoint_truncates_wal() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("brain.sqlite")).unwrap();
        {
            let conn = db.lock_conn().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }
        db.checkpoint().unwrap();
        assert_eq!(db.fingerprint().wal_len, 0);
    }
}
