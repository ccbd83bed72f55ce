//! The n-gram brain: tokenization, sequence records, learning and generation.

mod engine;
mod sequence;
mod tokenize;

pub use engine::{Brain, BrainStats};
pub use sequence::{sequence_hash, LexiconEntry, Sequence};
pub use tokenize::{normalize_token, tokenize_line, tokenize_lines};
