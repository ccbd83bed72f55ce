//! Consistent snapshot export of a backing file.

use super::database::Database;
use crate::error::{BrainError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

const SNAPSHOT_FILE_NAME: &str = "snapshot.sqlite";

impl Database {
    /// Stream a consistent copy of the backing file into `writer`, optionally
    /// gzip-compressed.
    ///
    /// The copy is written with `VACUUM INTO` to a temporary file while the
    /// connection lock is held. The lock is released before `writer` sees
    /// any bytes, so a slow consumer never blocks other callers. Returns the
    /// number of bytes read from the copy.
    pub fn export_snapshot<W: Write>(&self, writer: W, compress: bool) -> Result<u64> {
        let parent = self
            .path()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".brain-export-")
            .tempdir_in(parent)
            .map_err(|e| BrainError::io_with_path(e, parent))?;
        let snapshot_path = scratch.path().join(SNAPSHOT_FILE_NAME);
        let target = snapshot_path.to_str().ok_or_else(|| BrainError::Io {
            message: "Snapshot path is not valid UTF-8".to_string(),
            path: Some(snapshot_path.clone()),
            source: None,
        })?;

        {
            let conn = self.lock_conn()?;
            conn.execute("VACUUM INTO ?1", [target])?;
        }
        debug!("Wrote snapshot copy to {}", snapshot_path.display());

        let mut file =
            File::open(&snapshot_path).map_err(|e| BrainError::io_with_path(e, &snapshot_path))?;

        let copied = if compress {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            let copied = io::copy(&mut file, &mut encoder)?;
            encoder.finish()?.flush()?;
            copied
        } else {
            let mut writer = writer;
            let copied = io::copy(&mut file, &mut writer)?;
            writer.flush()?;
            copied
        };

        info!(
            "Exported snapshot of {} ({} bytes, compressed: {})",
            self.path().display(),
            copied,
            compress
        );
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writer that, on its first write, inserts a row from another thread
    /// and records whether that insert went through.
    struct InsertingWriter {
        db: Database,
        inserted: Option<bool>,
        bytes: Vec<u8>,
    }

    impl Write for InsertingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.inserted.is_none() {
                let db = self.db.clone();
                let (tx, rx) = mpsc::channel();
                std::thread::spawn(move || {
                    let ok = db
                        .lock_conn()
                        .and_then(|conn| {
                            conn.execute("INSERT INTO t VALUES ('during')", [])
                                .map_err(Into::into)
                        })
                        .is_ok();
                    let _ = tx.send(ok);
                });
                self.inserted = Some(rx.recv_timeout(Duration::from_secs(5)).unwrap_or(false));
            }
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn count_rows(path: &Path) -> i64 {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    fn populated_db() -> (TempDir, Database) {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("brain.sqlite")).unwrap();
        {
            let conn = db.lock_conn().unwrap();
            conn.execute_batch(
                "CREATE TABLE t (x TEXT); INSERT INTO t VALUES ('hello'), ('world');",
            )
            .unwrap();
        }
        (temp, db)
    }

    #[test]
    fn test_plain_export_is_a_valid_database() {
        let (temp, db) = populated_db();
        let mut bytes = Vec::new();
        let copied = db.export_snapshot(&mut bytes, false).unwrap();
        assert_eq!(copied as usize, bytes.len());
        assert!(bytes.starts_with(b"SQLite format 3\0"));

        let copy_path = temp.path().join("copy.sqlite");
        std::fs::write(&copy_path, &bytes).unwrap();
        assert_eq!(count_rows(&copy_path), 2);
    }

    #[test]
    fn test_writes_proceed_while_export_streams() {
        let (temp, db) = populated_db();
        let mut writer = InsertingWriter {
            db: db.clone(),
            inserted: None,
            bytes: Vec::new(),
        };
        db.export_snapshot(&mut writer, false).unwrap();
        assert_eq!(writer.inserted, Some(true));

        let copy_path = temp.path().join("copy.sqlite");
        std::fs::write(&copy_path, &writer.bytes).unwrap();
        assert_eq!(count_rows(&copy_path), 2, "snapshot predates the insert");

        let live: i64 = db
            .lock_conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(live, 3);
    }

    #[test]
    fn test_scratch_copy_is_removed() {
        let (temp, db) = populated_db();
        db.export_snapshot(io::sink(), true).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".brain-export-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_gzip_export_round_trips() {
        let (_temp, db) = populated_db();
        let mut compressed = Vec::new();
        let copied = db.export_snapshot(&mut compressed, true).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded.len() as u64, copied);
        assert!(decoded.starts_with(b"SQLite format 3\0"));
    }
}
