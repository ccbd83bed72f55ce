//! Sequence records and lexicon entries.

use crate::config::BrainDefaults;
use crate::store::codec;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Hash of a token window: the tokens joined with the reserved separator.
///
/// Tokens never contain the separator, so distinct windows always produce
/// distinct hashes.
pub fn sequence_hash<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut hash = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            hash.push(BrainDefaults::SEPARATOR);
        }
        hash.push_str(token.as_ref());
    }
    hash
}

/// A learned token window and what was seen around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub tokens: Vec<String>,
    /// Some learned line began with this window.
    pub can_start: bool,
    /// Some learned line ended with this window.
    pub can_end: bool,
    /// Token that followed the window → times seen.
    #[serde(with = "codec::tagged_map")]
    pub next_tokens: BTreeMap<String, u64>,
    /// Token that preceded the window → times seen.
    #[serde(with = "codec::tagged_map")]
    pub previous_tokens: BTreeMap<String, u64>,
}

impl Sequence {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            can_start: false,
            can_end: false,
            next_tokens: BTreeMap::new(),
            previous_tokens: BTreeMap::new(),
        }
    }

    pub fn hash(&self) -> String {
        sequence_hash(&self.tokens)
    }

    pub fn record_next(&mut self, token: &str) {
        *self.next_tokens.entry(token.to_string()).or_insert(0) += 1;
    }

    pub fn record_previous(&mut self, token: &str) {
        *self.previous_tokens.entry(token.to_string()).or_insert(0) += 1;
    }
}

/// Lexicon value: hashes of every sequence containing a word.
///
/// Stored as a tagged set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexiconEntry(BTreeSet<String>);

impl LexiconEntry {
    /// Add a hash. Returns `false` if it was already present.
    pub fn insert(&mut self, hash: impl Into<String>) -> bool {
        self.0.insert(hash.into())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.0.contains(hash)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uniformly random hash from the entry.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Option<&String> {
        if self.0.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.0.len());
        self.0.iter().nth(idx)
    }
}

impl FromIterator<String> for LexiconEntry {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for LexiconEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        codec::tagged_set::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for LexiconEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        codec::tagged_set::deserialize(deserializer).map(LexiconEntry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[test]
    fn test_hash_is_order_sensitive() {
        let a = sequence_hash(&["the", "quick", "fox"]);
        let b = sequence_hash(&["quick", "the", "fox"]);
        let c = sequence_hash(&["the", "quick", "dog"]);
        assert_eq!(a, sequence_hash(&["the", "quick", "fox"]));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "the\u{1f}quick\u{1f}fox");
    }

    #[test]
    fn test_hash_does_not_merge_boundaries() {
        assert_ne!(sequence_hash(&["ab", "c"]), sequence_hash(&["a", "bc"]));
    }

    #[test]
    fn test_sequence_wire_format() {
        let mut seq = Sequence::new(vec!["a".into(), "b".into(), "c".into()]);
        seq.can_start = true;
        seq.record_next("d");
        seq.record_next("d");

        let value = serde_json::to_value(&seq).unwrap();
        assert_eq!(value["canStart"], json!(true));
        assert_eq!(
            value["nextTokens"],
            json!({"kind": "map", "entries": [["d", 2]]})
        );
        assert_eq!(
            value["previousTokens"],
            json!({"kind": "map", "entries": []})
        );

        let back: Sequence = serde_json::from_value(value).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn test_lexicon_entry_wire_format() {
        let entry: LexiconEntry = ["h2".to_string(), "h1".to_string()].into_iter().collect();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({"kind": "set", "entries": ["h1", "h2"]}));

        let back: LexiconEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_lexicon_entry_choose() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(LexiconEntry::default().choose(&mut rng).is_none());

        let entry: LexiconEntry = ["only".to_string()].into_iter().collect();
        assert_eq!(entry.choose(&mut rng).map(String::as_str), Some("only"));
    }
}
