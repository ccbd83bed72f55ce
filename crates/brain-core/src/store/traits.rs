//! Key/value store trait.

use crate::error::Result;

/// Durable, structured key/value storage for one logical collection.
///
/// All operations are synchronous to match rusqlite's API. Lookups that find
/// nothing return `Ok(None)`; a stored payload that fails to decode is also
/// reported as `Ok(None)` after being logged.
pub trait KeyValueStore<K, V>: Send + Sync {
    /// Owned, lazy iterator over every entry in scan order.
    type Entries: Iterator<Item = (K, V)>;

    /// Get the value stored under `key`.
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Insert or replace the value under `key` in a single transaction.
    fn set(&self, key: &K, value: &V) -> Result<()>;

    /// Remove `key`. Returns whether a row was deleted.
    fn delete(&self, key: &K) -> Result<bool>;

    /// Check whether `key` exists in the backing table.
    fn has(&self, key: &K) -> Result<bool>;

    /// Number of entries in the collection.
    fn size(&self) -> Result<usize>;

    /// Soft wipe: move the current contents aside under a timestamped backup
    /// name and start over empty. Returns the backup name.
    fn clear(&self) -> Result<String>;

    /// Stream every entry. Each call starts again from the beginning.
    fn entries(&self) -> Self::Entries;

    /// Stream every key.
    fn keys(&self) -> impl Iterator<Item = K> {
        self.entries().map(|(key, _)| key)
    }

    /// Stream every value.
    fn values(&self) -> impl Iterator<Item = V> {
        self.entries().map(|(_, value)| value)
    }
}
