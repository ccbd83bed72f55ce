//! SQLite-backed key/value collection.

use super::codec;
use super::database::Database;
use super::traits::KeyValueStore;
use crate::config::StoreConfig;
use crate::error::{BrainError, Result};
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::path::Path;
use tracing::{debug, info, warn};

/// One logical collection stored as a `(id, key, value)` table.
///
/// Keys and values are stored as JSON text (see [`codec`]). Cloning is cheap
/// and every clone talks to the same table through the same connection.
pub struct SqliteStore<K, V> {
    db: Database,
    table: String,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for SqliteStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

/// A decoded row together with its scan position.
#[derive(Debug, Clone)]
pub struct StoredRow<K, V> {
    pub id: i64,
    pub key: K,
    pub value: V,
}

/// One page of a keyset scan.
#[derive(Debug, Clone)]
pub struct ScanPage<K, V> {
    /// Rows that decoded cleanly.
    pub rows: Vec<StoredRow<K, V>>,
    /// Id of the last physical row read, including rows that failed to decode.
    pub last_id: Option<i64>,
    /// Number of physical rows read.
    pub fetched: usize,
}

impl<K, V> SqliteStore<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Open a store with its own backing file.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let db = Database::open(path)?;
        Self::new(db, table)
    }

    /// Attach a collection to an already-open backing file.
    pub fn new(db: Database, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        {
            let conn = db.lock_conn()?;
            create_table(&conn, table)?;
        }
        Ok(Self {
            db,
            table: table.to_string(),
            _marker: PhantomData,
        })
    }

    /// The backing file this collection lives in.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Read up to `limit` rows with `id > after_id`, in id order.
    ///
    /// Rows whose payload does not decode are skipped with a warning but still
    /// advance `last_id`, so a scan never stalls on a corrupt row.
    pub fn scan_page(&self, after_id: i64, limit: usize) -> Result<ScanPage<K, V>> {
        let conn = self.db.lock_conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, key, value FROM \"{}\" WHERE id > ?1 ORDER BY id LIMIT ?2",
            self.table
        ))?;

        let raw = stmt
            .query_map(params![after_id, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        let fetched = raw.len();
        let last_id = raw.last().map(|(id, _, _)| *id);
        let rows = raw
            .into_iter()
            .filter_map(|(id, key, value)| self.decode_row(id, &key, &value))
            .collect();

        Ok(ScanPage {
            rows,
            last_id,
            fetched,
        })
    }

    /// Whether the collection has no rows. Stops at the first row found.
    pub fn is_empty(&self) -> Result<bool> {
        let conn = self.db.lock_conn()?;
        let exists: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM \"{}\")", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(!exists)
    }

    /// Random key, or `None` when the collection is empty.
    ///
    /// Draws a row id between the smallest and largest ids and takes the
    /// first row at or after it, so every lookup is an index seek. Ids
    /// left as gaps by deletes make the row after a gap more likely.
    pub fn random_key<R: Rng>(&self, rng: &mut R) -> Result<Option<K>> {
        let conn = self.db.lock_conn()?;
        let (min_id, max_id): (Option<i64>, Option<i64>) = conn.query_row(
            &format!("SELECT MIN(id), MAX(id) FROM \"{}\"", self.table),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (Some(min_id), Some(max_id)) = (min_id, max_id) else {
            return Ok(None);
        };

        let pick = rng.random_range(min_id..=max_id);
        let key: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT key FROM \"{}\" WHERE id >= ?1 ORDER BY id LIMIT 1",
                    self.table
                ),
                params![pick],
                |row| row.get(0),
            )
            .optional()?;

        Ok(key.and_then(|k| match codec::decode(&k) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Malformed key in {} at id >= {}: {}", self.table, pick, e);
                None
            }
        }))
    }

    /// Backup tables left behind by [`KeyValueStore::clear`], oldest first.
    pub fn backups(&self) -> Result<Vec<String>> {
        let conn = self.db.lock_conn()?;
        let pattern = format!("{}{}*", self.table, StoreConfig::BACKUP_INFIX);
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name GLOB ?1 ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn decode_row(&self, id: i64, key: &str, value: &str) -> Option<StoredRow<K, V>> {
        let key = match codec::decode(key) {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping row {} in {}: malformed key: {}", id, self.table, e);
                return None;
            }
        };
        match codec::decode(value) {
            Ok(value) => Some(StoredRow { id, key, value }),
            Err(e) => {
                warn!("Skipping row {} in {}: malformed payload: {}", id, self.table, e);
                None
            }
        }
    }
}

impl<K, V> KeyValueStore<K, V> for SqliteStore<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    type Entries = Entries<K, V>;

    fn get(&self, key: &K) -> Result<Option<V>> {
        let key_text = codec::encode(key)?;
        let conn = self.db.lock_conn()?;
        let payload: Option<String> = conn
            .query_row(
                &format!("SELECT value FROM \"{}\" WHERE key = ?1", self.table),
                params![key_text],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        let Some(payload) = payload else {
            return Ok(None);
        };

        match codec::decode(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "Malformed payload for {} in {}, treating as missing: {}",
                    key_text, self.table, e
                );
                Ok(None)
            }
        }
    }

    fn set(&self, key: &K, value: &V) -> Result<()> {
        let key_text = codec::encode(key)?;
        let payload = codec::encode(value)?;

        let mut conn = self.db.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.table
            ),
            params![key_text, payload],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &K) -> Result<bool> {
        let key_text = codec::encode(key)?;
        let conn = self.db.lock_conn()?;
        let rows = conn.execute(
            &format!("DELETE FROM \"{}\" WHERE key = ?1", self.table),
            params![key_text],
        )?;
        Ok(rows > 0)
    }

    fn has(&self, key: &K) -> Result<bool> {
        let key_text = codec::encode(key)?;
        let conn = self.db.lock_conn()?;
        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM \"{}\" WHERE key = ?1 LIMIT 1", self.table),
                params![key_text],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    fn size(&self) -> Result<usize> {
        let conn = self.db.lock_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<String> {
        let mut conn = self.db.lock_conn()?;
        let backup = unused_backup_name(&conn, &self.table)?;

        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "ALTER TABLE \"{}\" RENAME TO \"{}\";",
            self.table, backup
        ))?;
        create_table(&tx, &self.table)?;
        tx.commit()?;

        info!("Moved {} aside as {}", self.table, backup);
        Ok(backup)
    }

    fn entries(&self) -> Entries<K, V> {
        Entries {
            store: self.clone(),
            after_id: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// Lazy keyset-paginated iteration over a collection.
///
/// No lock is held between pages. Storage errors end the iteration early
/// and are logged.
pub struct Entries<K, V> {
    store: SqliteStore<K, V>,
    after_id: i64,
    buffer: VecDeque<(K, V)>,
    exhausted: bool,
}

impl<K, V> Iterator for Entries<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(entry);
            }
            if self.exhausted {
                return None;
            }

            match self
                .store
                .scan_page(self.after_id, StoreConfig::SCAN_PAGE_SIZE)
            {
                Ok(page) => {
                    if page.fetched < StoreConfig::SCAN_PAGE_SIZE {
                        self.exhausted = true;
                    }
                    if let Some(id) = page.last_id {
                        self.after_id = id;
                    }
                    self.buffer
                        .extend(page.rows.into_iter().map(|row| (row.key, row.value)));
                }
                Err(e) => {
                    warn!("Scan of {} stopped early: {}", self.store.table, e);
                    self.exhausted = true;
                }
            }
        }
    }
}

fn create_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL
        );",
        table
    ))
    .map_err(|e| BrainError::Database {
        message: format!("Failed to initialize table {}: {}", table, e),
        source: Some(e),
    })?;
    debug!("Ensured table {}", table);
    Ok(())
}

fn unused_backup_name(conn: &Connection, table: &str) -> Result<String> {
    let base = format!(
        "{}{}{}",
        table,
        StoreConfig::BACKUP_INFIX,
        Utc::now().format(StoreConfig::BACKUP_TIMESTAMP_FORMAT)
    );
    let mut candidate = base.clone();
    let mut attempt = 1;
    loop {
        let taken = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE name = ?1",
                params![candidate],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{}_{}", base, attempt);
        attempt += 1;
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed.
fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BrainError::Config {
            message: format!("Invalid collection name: {:?}", table),
        })
    }
}
