//! Brain Core - a persistent n-gram brain with a rebuildable sequence index.
//!
//! The crate has three parts:
//!
//! - [`store`]: SQLite-backed key/value collections with a tagged JSON payload
//!   encoding, lazy iteration and a soft-wipe `clear`.
//! - [`brain`]: learns token windows from text and generates replies by
//!   walking them forward and backward.
//! - [`index`]: an in-memory, chunk-built projection of the sequence table
//!   that supports filtering, sorting and paging with staleness tracking.
//!
//! # Example
//!
//! ```rust,ignore
//! use brain_core::{Brain, BrainConfig, IndexQuery, SequenceIndex};
//!
//! let brain = Brain::open("/path/to/brain.sqlite", BrainConfig::default())?;
//! brain.learn("the quick fox ran")?;
//!
//! let seed = brain.get_seed("fox").unwrap_or_default();
//! println!("{}", brain.get_response(&seed));
//!
//! let index = SequenceIndex::for_brain(&brain);
//! let page = index.query(&IndexQuery::default());
//! println!("{} sequences", page.total);
//! ```

pub mod brain;
pub mod config;
pub mod error;
pub mod index;
pub mod store;

pub use brain::{Brain, BrainStats, LexiconEntry, Sequence};
pub use config::{BrainConfig, BrainDefaults, IndexConfig, NextTokenStrategy, StoreConfig};
pub use error::{BrainError, Result};
pub use index::{
    lookup_sequence, IndexFilters, IndexPage, IndexQuery, IndexRow, IndexState, IndexStatus,
    SequenceDetail, SequenceIndex, SortDirection, SortKey,
};
pub use store::{Database, KeyValueStore, SqliteStore};
