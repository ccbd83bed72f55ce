//! Text → token normalization.

use crate::config::BrainDefaults;

/// Case-fold a raw word and strip the reserved separator from it.
pub fn normalize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != BrainDefaults::SEPARATOR)
        .collect::<String>()
        .to_lowercase()
}

/// Split one line into normalized, non-empty tokens.
pub fn tokenize_line(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(normalize_token)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Tokenize every line of `text`.
pub fn tokenize_lines(text: &str) -> impl Iterator<Item = Vec<String>> + '_ {
    text.lines().map(tokenize_line)
}
