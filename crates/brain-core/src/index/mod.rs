//! Secondary index: a rebuildable in-memory projection of the sequence table.
//!
//! Rows are built in chunks by a [`BuildTask`] and queried through a
//! [`SequenceIndex`] handle. Builds are identified by a monotonic build id; a
//! build that is no longer current stops at its next chunk boundary.

mod build;
mod detail;
mod query;
mod row;
mod secondary;

pub use build::{BuildStep, BuildTask};
pub use detail::{clamp_neighbor_limit, lookup_sequence, Neighbor, SequenceDetail};
pub use query::{IndexFilters, IndexQuery, SortDirection, SortKey};
pub use row::IndexRow;
pub use secondary::{IndexPage, IndexState, IndexStatus, SequenceIndex};
