//! Centralized configuration for the brain.
//!
//! Runtime tunables live in [`BrainConfig`], which can be loaded from a JSON
//! file. Fixed limits and names are grouped as associated constants.

use crate::error::{BrainError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How the generator picks the next (or previous) token from a neighbor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NextTokenStrategy {
    /// Every distinct neighbor is equally likely, regardless of its count.
    #[default]
    UniformOverDistinct,
    /// Neighbors are picked proportionally to how often they were observed.
    WeightedByFrequency,
}

/// Runtime configuration for a brain instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrainConfig {
    /// Width of the sliding token window.
    pub chain_length: usize,
    /// Hard cap on tokens added in each walk direction.
    pub max_walk_steps: usize,
    /// Neighbor selection strategy used while walking.
    pub strategy: NextTokenStrategy,
    /// Rows converted per scheduling tick during an index build.
    pub index_chunk_size: usize,
}

impl BrainConfig {
    pub const DEFAULT_CHAIN_LENGTH: usize = 3;
    pub const DEFAULT_MAX_WALK_STEPS: usize = 128;
    pub const DEFAULT_INDEX_CHUNK_SIZE: usize = 5_000;

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| BrainError::io_with_path(e, path))?;
        let config: BrainConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no brain can run with.
    pub fn validate(&self) -> Result<()> {
        if self.chain_length < 1 {
            return Err(BrainError::Config {
                message: "chainLength must be at least 1".to_string(),
            });
        }
        if self.max_walk_steps < 1 {
            return Err(BrainError::Config {
                message: "maxWalkSteps must be at least 1".to_string(),
            });
        }
        if self.index_chunk_size < 1 {
            return Err(BrainError::Config {
                message: "indexChunkSize must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            chain_length: Self::DEFAULT_CHAIN_LENGTH,
            max_walk_steps: Self::DEFAULT_MAX_WALK_STEPS,
            strategy: NextTokenStrategy::default(),
            index_chunk_size: Self::DEFAULT_INDEX_CHUNK_SIZE,
        }
    }
}

/// Fixed values shared by the learning and generation paths.
pub struct BrainDefaults;

impl BrainDefaults {
    /// Joins the tokens of a window into its hash. Stripped from every token.
    pub const SEPARATOR: char = '\u{1f}';
    /// Returned by generation when nothing has been learned yet.
    pub const EMPTY_BRAIN_RESPONSE: &'static str = "My brain is empty. Teach me something first.";
}

/// Backing-store names and limits.
pub struct StoreConfig;

impl StoreConfig {
    pub const LEXICON_TABLE: &'static str = "lexicon";
    pub const SEQUENCES_TABLE: &'static str = "sequences";
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
    /// Rows fetched per round trip by lazy iteration.
    pub const SCAN_PAGE_SIZE: usize = 1_000;
    /// Infix between a collection name and its soft-wipe timestamp.
    pub const BACKUP_INFIX: &'static str = "_backup_";
    pub const BACKUP_TIMESTAMP_FORMAT: &'static str = "%Y%m%d%H%M%S%3f";
}

/// Query-layer clamps for the secondary index.
pub struct IndexConfig;

impl IndexConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 50;
    pub const MIN_PAGE_SIZE: usize = 1;
    pub const MAX_PAGE_SIZE: usize = 500;
    pub const DEFAULT_NEIGHBOR_LIMIT: usize = 50;
    pub const MIN_NEIGHBOR_LIMIT: usize = 1;
    pub const MAX_NEIGHBOR_LIMIT: usize = 1_000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BrainConfig::default();
        assert_eq!(config.chain_length, 3);
        assert_eq!(config.max_walk_steps, 128);
        assert_eq!(config.strategy, NextTokenStrategy::UniformOverDistinct);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("brain.json");
        std::fs::write(&path, r#"{"chainLength": 2, "strategy": "weightedByFrequency"}"#)
            .unwrap();

        let config = BrainConfig::load(&path).unwrap();
        assert_eq!(config.chain_length, 2);
        assert_eq!(config.strategy, NextTokenStrategy::WeightedByFrequency);
        assert_eq!(config.max_walk_steps, BrainConfig::DEFAULT_MAX_WALK_STEPS);
    }

    #[test]
    fn test_load_rejects_zero_chain() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("brain.json");
        std::fs::write(&path, r#"{"chainLength": 0}"#).unwrap();

        let err = BrainConfig::load(&path).unwrap_err();
        assert!(matches!(err, BrainError::Config { .. }));
    }

    #[test]
    fn test_page_clamps_are_ordered() {
        assert!(IndexConfig::MIN_PAGE_SIZE <= IndexConfig::DEFAULT_PAGE_SIZE);
        assert!(IndexConfig::DEFAULT_PAGE_SIZE <= IndexConfig::MAX_PAGE_SIZE);
        assert!(IndexConfig::DEFAULT_NEIGHBOR_LIMIT <= IndexConfig::MAX_NEIGHBOR_LIMIT);
    }
}
