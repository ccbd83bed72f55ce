//! File-backed structured key/value storage.
//!
//! One SQLite file ([`Database`]) holds every collection of a brain, one
//! table per collection ([`SqliteStore`]). Values round-trip through the
//! tagged JSON encoding in [`codec`].

pub mod codec;
mod database;
mod snapshot;
mod sqlite;
mod traits;

pub use database::{Database, FileFingerprint};
pub use sqlite::{Entries, ScanPage, SqliteStore, StoredRow};
pub use traits::KeyValueStore;
