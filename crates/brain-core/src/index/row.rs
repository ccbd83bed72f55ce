//! Flattened per-sequence summaries held by the index.

use crate::brain::Sequence;
use serde::{Deserialize, Serialize};

/// Denormalized snapshot of one sequence record.
///
/// Neighbor tables are reduced to their distinct counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRow {
    pub hash: String,
    /// Tokens joined with single spaces, lower-cased.
    pub text: String,
    pub can_start: bool,
    pub can_end: bool,
    pub next_count: usize,
    pub prev_count: usize,
    pub token_count: usize,
    /// Length in chars of the shortest token.
    pub min_len: usize,
    /// Length in chars of the longest token.
    pub max_len: usize,
}

impl IndexRow {
    pub fn from_sequence(hash: String, sequence: &Sequence) -> Self {
        let lengths = sequence.tokens.iter().map(|t| t.chars().count());
        let min_len = lengths.clone().min().unwrap_or(0);
        let max_len = lengths.max().unwrap_or(0);

        Self {
            hash,
            text: sequence.tokens.join(" ").to_lowercase(),
            can_start: sequence.can_start,
            can_end: sequence.can_end,
            next_count: sequence.next_tokens.len(),
            prev_count: sequence.previous_tokens.len(),
            token_count: sequence.tokens.len(),
            min_len,
            max_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sequence() {
        let mut seq = Sequence::new(vec!["a".into(), "Quick".into(), "fox".into()]);
        seq.can_end = true;
        seq.record_next("ran");
        seq.record_next("ran");
        seq.record_next("sat");
        seq.record_previous("the");

        let row = IndexRow::from_sequence(seq.hash(), &seq);
        assert_eq!(row.text, "a quick fox");
        assert!(!row.can_start);
        assert!(row.can_end);
        assert_eq!(row.next_count, 2);
        assert_eq!(row.prev_count, 1);
        assert_eq!(row.token_count, 3);
        assert_eq!(row.min_len, 1);
        assert_eq!(row.max_len, 5);
    }
}
