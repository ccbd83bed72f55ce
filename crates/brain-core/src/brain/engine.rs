//! Learning and generation over the lexicon and sequence collections.

use super::sequence::{sequence_hash, LexiconEntry, Sequence};
use super::tokenize::{normalize_token, tokenize_line, tokenize_lines};
use crate::config::{BrainConfig, BrainDefaults, NextTokenStrategy, StoreConfig};
use crate::error::Result;
use crate::store::{Database, KeyValueStore, SqliteStore};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

/// Collection sizes of a brain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainStats {
    pub words: usize,
    pub sequences: usize,
}

/// The n-gram brain.
///
/// Owns two collections in one backing file:
/// - `lexicon`: word → hashes of every sequence containing it
/// - `sequences`: hash → [`Sequence`]
///
/// Construct one per backing file at process start and hand it to whatever
/// needs it; there is no global instance.
pub struct Brain {
    config: BrainConfig,
    db: Database,
    lexicon: SqliteStore<String, LexiconEntry>,
    sequences: SqliteStore<String, Sequence>,
}

impl Brain {
    /// Open (or create) a brain at `path`.
    pub fn open(path: impl AsRef<Path>, config: BrainConfig) -> Result<Self> {
        let db = Database::open(path)?;
        Self::new(db, config)
    }

    /// Attach a brain to an already-open backing file.
    pub fn new(db: Database, config: BrainConfig) -> Result<Self> {
        config.validate()?;
        let lexicon = SqliteStore::new(db.clone(), StoreConfig::LEXICON_TABLE)?;
        let sequences = SqliteStore::new(db.clone(), StoreConfig::SEQUENCES_TABLE)?;
        Ok(Self {
            config,
            db,
            lexicon,
            sequences,
        })
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn lexicon(&self) -> &SqliteStore<String, LexiconEntry> {
        &self.lexicon
    }

    pub fn sequences(&self) -> &SqliteStore<String, Sequence> {
        &self.sequences
    }

    pub fn stats(&self) -> Result<BrainStats> {
        Ok(BrainStats {
            words: self.lexicon.size()?,
            sequences: self.sequences.size()?,
        })
    }

    /// Learn every line of `text`.
    ///
    /// Returns `true` if at least one line had `chain_length` or more tokens.
    /// Every touched record is committed before this returns.
    pub fn learn(&self, text: &str) -> Result<bool> {
        let mut learned = false;
        for tokens in tokenize_lines(text) {
            if tokens.len() < self.config.chain_length {
                continue;
            }
            self.learn_line(&tokens)?;
            learned = true;
        }
        Ok(learned)
    }

    fn learn_line(&self, tokens: &[String]) -> Result<()> {
        let width = self.config.chain_length;
        let last = tokens.len() - width;

        for c in 0..=last {
            let window = &tokens[c..c + width];
            let hash = sequence_hash(window);

            let mut sequence = self
                .sequences
                .get(&hash)?
                .unwrap_or_else(|| Sequence::new(window.to_vec()));

            if c == 0 {
                sequence.can_start = true;
            }
            if c == last {
                sequence.can_end = true;
            }
            if c > 0 {
                sequence.record_previous(&tokens[c - 1]);
            }
            if c < last {
                sequence.record_next(&tokens[c + width]);
            }
            self.sequences.set(&hash, &sequence)?;

            for word in window {
                self.link_word(word, &hash)?;
            }
        }

        debug!("Learned line of {} tokens", tokens.len());
        Ok(())
    }

    fn link_word(&self, word: &String, hash: &str) -> Result<()> {
        let mut entry = self.lexicon.get(word)?.unwrap_or_default();
        if entry.insert(hash) {
            self.lexicon.set(word, &entry)?;
        }
        Ok(())
    }

    /// Pick a seed word. See [`Brain::get_seed_with`].
    pub fn get_seed(&self, text: &str) -> Option<String> {
        self.get_seed_with(text, &mut rand::rng())
    }

    /// Pick a seed word: a random token of `text`, or a random lexicon word
    /// when `text` has no tokens.
    ///
    /// The token is not checked against the lexicon here; generation falls
    /// back to a random word for unknown seeds. Returns `None` only when both
    /// `text` and the lexicon are empty.
    pub fn get_seed_with<R: Rng>(&self, text: &str, rng: &mut R) -> Option<String> {
        let tokens = tokenize_line(text);
        if tokens.is_empty() {
            return self.random_word(rng);
        }
        let idx = rng.random_range(0..tokens.len());
        tokens.into_iter().nth(idx)
    }

    /// Generate a reply around `seed`. See [`Brain::get_response_with`].
    pub fn get_response(&self, seed: &str) -> String {
        self.get_response_with(seed, &mut rand::rng())
    }

    /// Generate a reply by walking outward from a random sequence containing
    /// `seed`.
    ///
    /// Storage failures end the walk early instead of failing the call. An
    /// empty brain returns [`BrainDefaults::EMPTY_BRAIN_RESPONSE`]. Each walk
    /// direction adds at most `max_walk_steps` tokens.
    pub fn get_response_with<R: Rng>(&self, seed: &str, rng: &mut R) -> String {
        match self.sequences.is_empty() {
            Ok(false) => {}
            Ok(true) => return BrainDefaults::EMPTY_BRAIN_RESPONSE.to_string(),
            Err(e) => {
                warn!("Could not check sequence table: {}", e);
                return BrainDefaults::EMPTY_BRAIN_RESPONSE.to_string();
            }
        }

        let seed = normalize_token(seed);
        let (word, entry) = match self.lexicon_entry(&seed) {
            Some(entry) => (seed, entry),
            None => {
                let random = self
                    .random_word(rng)
                    .and_then(|word| self.lexicon_entry(&word).map(|entry| (word, entry)));
                match random {
                    Some(found) => found,
                    None => return BrainDefaults::EMPTY_BRAIN_RESPONSE.to_string(),
                }
            }
        };

        let Some(start) = entry.choose(rng).and_then(|hash| self.lookup(hash)) else {
            return word;
        };

        let mut reply: VecDeque<String> = start.tokens.iter().cloned().collect();
        self.walk_forward(&start, &mut reply, rng);
        self.walk_backward(&start, &mut reply, rng);

        Vec::from(reply).join(" ").trim().to_string()
    }

    fn walk_forward<R: Rng>(&self, start: &Sequence, reply: &mut VecDeque<String>, rng: &mut R) {
        let width = self.config.chain_length;
        let mut current = start.clone();
        let mut steps = 0;

        while !current.can_end && steps < self.config.max_walk_steps {
            let Some(token) = self.pick_neighbor(&current.next_tokens, rng) else {
                break;
            };
            reply.push_back(token);
            steps += 1;

            let skip = reply.len().saturating_sub(width);
            let window: Vec<&String> = reply.iter().skip(skip).collect();
            match self.lookup(&sequence_hash(&window)) {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    fn walk_backward<R: Rng>(&self, start: &Sequence, reply: &mut VecDeque<String>, rng: &mut R) {
        let width = self.config.chain_length;
        let mut current = start.clone();
        let mut steps = 0;

        while !current.can_start && steps < self.config.max_walk_steps {
            let Some(token) = self.pick_neighbor(&current.previous_tokens, rng) else {
                break;
            };
            reply.push_front(token);
            steps += 1;

            let window: Vec<&String> = reply.iter().take(width).collect();
            match self.lookup(&sequence_hash(&window)) {
                Some(previous) => current = previous,
                None => break,
            }
        }
    }

    fn pick_neighbor<R: Rng>(&self, table: &BTreeMap<String, u64>, rng: &mut R) -> Option<String> {
        if table.is_empty() {
            return None;
        }

        if self.config.strategy == NextTokenStrategy::WeightedByFrequency {
            let total: u64 = table.values().fold(0u64, |acc, n| acc.saturating_add(*n));
            if total > 0 {
                let mut pick = rng.random_range(0..total);
                for (token, count) in table {
                    if pick < *count {
                        return Some(token.clone());
                    }
                    pick -= count;
                }
            }
        }

        let idx = rng.random_range(0..table.len());
        table.keys().nth(idx).cloned()
    }

    fn lookup(&self, hash: &str) -> Option<Sequence> {
        match self.sequences.get(&hash.to_string()) {
            Ok(found) => found,
            Err(e) => {
                warn!("Sequence lookup failed, ending walk: {}", e);
                None
            }
        }
    }

    fn lexicon_entry(&self, word: &str) -> Option<LexiconEntry> {
        match self.lexicon.get(&word.to_string()) {
            Ok(Some(entry)) if !entry.is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                warn!("Lexicon lookup failed for {:?}: {}", word, e);
                None
            }
        }
    }

    fn random_word<R: Rng>(&self, rng: &mut R) -> Option<String> {
        match self.lexicon.random_key(rng) {
            Ok(word) => word,
            Err(e) => {
                warn!("Random lexicon pick failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn create_test_brain(config: BrainConfig) -> (TempDir, Brain) {
        let temp_dir = TempDir::new().unwrap();
        let brain = Brain::open(temp_dir.path().join("brain.sqlite"), config).unwrap();
        (temp_dir, brain)
    }

    fn hash_of(words: &[&str]) -> String {
        sequence_hash(words)
    }

    #[test]
    fn test_learn_two_lines_share_a_window() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        assert!(brain.learn("the quick fox ran").unwrap());
        assert!(brain.learn("the quick fox jumped").unwrap());

        let hash = hash_of(&["the", "quick", "fox"]);
        let seq = brain.sequences().get(&hash).unwrap().unwrap();
        assert!(seq.can_start);
        assert!(!seq.can_end);
        assert_eq!(seq.next_tokens.get("ran"), Some(&1));
        assert_eq!(seq.next_tokens.get("jumped"), Some(&1));
        assert_eq!(seq.next_tokens.len(), 2);
        assert!(seq.previous_tokens.is_empty());

        for word in ["the", "quick", "fox"] {
            let entry = brain.lexicon().get(&word.to_string()).unwrap().unwrap();
            assert!(entry.contains(&hash), "{} should reference the window", word);
        }

        let tail = brain
            .sequences()
            .get(&hash_of(&["quick", "fox", "ran"]))
            .unwrap()
            .unwrap();
        assert!(tail.can_end);
        assert!(!tail.can_start);
        assert_eq!(tail.previous_tokens.get("the"), Some(&1));
    }

    #[test]
    fn test_learn_skips_short_lines() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        assert!(!brain.learn("too short").unwrap());
        assert!(!brain.learn("").unwrap());
        assert_eq!(brain.stats().unwrap(), BrainStats { words: 0, sequences: 0 });

        // Mixed input still learns the long line.
        assert!(brain.learn("hi\nthis line is long").unwrap());
        assert_eq!(brain.stats().unwrap().sequences, 2);
    }

    #[test]
    fn test_exact_chain_length_line_starts_and_ends() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        brain.learn("a b c").unwrap();

        let seq = brain.sequences().get(&hash_of(&["a", "b", "c"])).unwrap().unwrap();
        assert!(seq.can_start);
        assert!(seq.can_end);
        assert!(seq.next_tokens.is_empty());
    }

    #[test]
    fn test_repeated_learning_is_monotonic() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        brain.learn("one two three four").unwrap();
        brain.learn("zero one two three four five").unwrap();
        brain.learn("one two three four").unwrap();

        let seq = brain
            .sequences()
            .get(&hash_of(&["one", "two", "three"]))
            .unwrap()
            .unwrap();
        assert!(seq.can_start, "canStart never resets");
        assert_eq!(seq.next_tokens.get("four"), Some(&3));
        assert_eq!(seq.previous_tokens.get("zero"), Some(&1));

        let end = brain
            .sequences()
            .get(&hash_of(&["two", "three", "four"]))
            .unwrap()
            .unwrap();
        assert!(end.can_end, "canEnd never resets");
        assert_eq!(end.next_tokens.get("five"), Some(&1));
    }

    #[test]
    fn test_learning_is_case_insensitive() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        brain.learn("The Quick Fox").unwrap();
        brain.learn("the quick FOX").unwrap();
        assert_eq!(brain.stats().unwrap().sequences, 1);
    }

    #[test]
    fn test_empty_brain_sentinel() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        assert_eq!(brain.get_response("anything"), BrainDefaults::EMPTY_BRAIN_RESPONSE);
        assert_eq!(brain.get_seed(""), None);
    }

    #[test]
    fn test_response_reproduces_single_line() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        brain.learn("the quick brown fox jumps over the lazy dog").unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        for seed in ["fox", "the", "dog", "unknown-word"] {
            let reply = brain.get_response_with(seed, &mut rng);
            assert_eq!(reply, "the quick brown fox jumps over the lazy dog");
        }
    }

    #[test]
    fn test_response_is_seeded_by_known_word() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        brain.learn("cats like warm milk").unwrap();
        brain.learn("dogs chase red balls").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(brain.get_response_with("balls", &mut rng), "dogs chase red balls");
        }
    }

    #[test]
    fn test_walk_is_bounded() {
        let config = BrainConfig {
            max_walk_steps: 4,
            ..BrainConfig::default()
        };
        let (_temp, brain) = create_test_brain(config);
        // The x-y-z cycle never ends on its own; only "z x q" can end.
        brain.learn("x y z x y z x y z x q").unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let reply = brain.get_response_with("y", &mut rng);
            let len = reply.split_whitespace().count();
            assert!(len >= 3);
            assert!(len <= 3 + 2 * 4, "reply too long: {}", reply);
        }
    }

    #[test]
    fn test_seed_from_text() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        let mut rng = StdRng::seed_from_u64(3);

        let seed = brain.get_seed_with("Hello There", &mut rng).unwrap();
        assert!(seed == "hello" || seed == "there");

        brain.learn("alpha beta gamma").unwrap();
        let seed = brain.get_seed_with("   ", &mut rng).unwrap();
        assert!(["alpha", "beta", "gamma"].contains(&seed.as_str()));
    }

    #[test]
    fn test_uniform_strategy_ignores_counts() {
        let (_temp, brain) = create_test_brain(BrainConfig::default());
        let table = BTreeMap::from([("common".to_string(), 1_000u64), ("rare".to_string(), 1)]);

        let mut rng = StdRng::seed_from_u64(11);
        let rare = (0..2_000)
            .filter(|_| brain.pick_neighbor(&table, &mut rng).as_deref() == Some("rare"))
            .count();
        assert!(rare > 800 && rare < 1_200, "rare picked {} times", rare);
    }

    #[test]
    fn test_weighted_strategy_follows_counts() {
        let config = BrainConfig {
            strategy: NextTokenStrategy::WeightedByFrequency,
            ..BrainConfig::default()
        };
        let (_temp, brain) = create_test_brain(config);
        let table = BTreeMap::from([("common".to_string(), 1_000u64), ("rare".to_string(), 1)]);

        let mut rng = StdRng::seed_from_u64(11);
        let rare = (0..2_000)
            .filter(|_| brain.pick_neighbor(&table, &mut rng).as_deref() == Some("rare"))
            .count();
        assert!(rare < 50, "rare picked {} times", rare);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = TempDir::new().unwrap();
        let config = BrainConfig {
            chain_length: 0,
            ..BrainConfig::default()
        };
        assert!(Brain::open(temp.path().join("b.sqlite"), config).is_err());
    }
}
