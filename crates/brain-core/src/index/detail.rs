//! Full single-record view of a sequence.

use crate::brain::Sequence;
use crate::config::IndexConfig;
use crate::error::{BrainError, Result};
use crate::store::{KeyValueStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A neighbor token and how often it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub token: String,
    pub count: u64,
}

/// One sequence with its neighbor tables, most frequent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDetail {
    pub hash: String,
    pub tokens: Vec<String>,
    pub can_start: bool,
    pub can_end: bool,
    pub next: Vec<Neighbor>,
    pub previous: Vec<Neighbor>,
    /// Distinct next tokens before capping.
    pub next_total: usize,
    /// Distinct previous tokens before capping.
    pub previous_total: usize,
}

/// Clamp a requested neighbor cap into the supported range.
pub fn clamp_neighbor_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(IndexConfig::DEFAULT_NEIGHBOR_LIMIT)
        .clamp(
            IndexConfig::MIN_NEIGHBOR_LIMIT,
            IndexConfig::MAX_NEIGHBOR_LIMIT,
        )
}

/// Load one sequence by hash straight from the store.
///
/// Each neighbor list is cut to the clamped `neighbor_limit`.
pub fn lookup_sequence(
    store: &SqliteStore<String, Sequence>,
    hash: &str,
    neighbor_limit: Option<usize>,
) -> Result<SequenceDetail> {
    let sequence = store
        .get(&hash.to_string())?
        .ok_or_else(|| BrainError::SequenceNotFound {
            hash: hash.to_string(),
        })?;
    let limit = clamp_neighbor_limit(neighbor_limit);

    Ok(SequenceDetail {
        hash: hash.to_string(),
        next_total: sequence.next_tokens.len(),
        previous_total: sequence.previous_tokens.len(),
        next: top_neighbors(&sequence.next_tokens, limit),
        previous: top_neighbors(&sequence.previous_tokens, limit),
        tokens: sequence.tokens,
        can_start: sequence.can_start,
        can_end: sequence.can_end,
    })
}

fn top_neighbors(table: &BTreeMap<String, u64>, limit: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = table
        .iter()
        .map(|(token, count)| Neighbor {
            token: token.clone(),
            count: *count,
        })
        .collect();
    // BTreeMap order already breaks ties by token.
    neighbors.sort_by(|a, b| b.count.cmp(&a.count));
    neighbors.truncate(limit);
    neighbors
}
