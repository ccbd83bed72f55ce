//! Filter, sort and paging parameters for index queries.

use super::row::IndexRow;
use crate::config::IndexConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Row predicates. Every supplied field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexFilters {
    /// Case-insensitive substring the flattened text must contain.
    pub contains: Option<String>,
    /// Case-insensitive substring the flattened text must not contain.
    pub excludes: Option<String>,
    pub can_start: Option<bool>,
    pub can_end: Option<bool>,
    pub min_next: Option<usize>,
    pub max_next: Option<usize>,
    pub min_prev: Option<usize>,
    pub max_prev: Option<usize>,
    /// Every token has at least this many chars.
    pub min_len: Option<usize>,
    /// No token has more than this many chars.
    pub max_len: Option<usize>,
}

/// Column to order results by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Build order; no sort is applied.
    #[default]
    Scan,
    Hash,
    Text,
    CanStart,
    CanEnd,
    NextCount,
    PrevCount,
    TokenCount,
    MinLen,
    MaxLen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A complete index query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexQuery {
    #[serde(flatten)]
    pub filters: IndexFilters,
    pub sort: SortKey,
    pub direction: SortDirection,
    /// Rows to skip. Negative values read as zero.
    #[serde(deserialize_with = "saturating_usize")]
    pub offset: usize,
    /// Page size; clamped into `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`. Any JSON
    /// number is accepted, including negative and oversized ones.
    #[serde(deserialize_with = "saturating_usize_opt")]
    pub limit: Option<usize>,
}

fn saturating_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    serde_json::Number::deserialize(deserializer).map(|n| number_to_usize(&n))
}

fn saturating_usize_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<usize>, D::Error> {
    Option::<serde_json::Number>::deserialize(deserializer).map(|n| n.as_ref().map(number_to_usize))
}

fn number_to_usize(n: &serde_json::Number) -> usize {
    match n.as_u64() {
        Some(v) => usize::try_from(v).unwrap_or(usize::MAX),
        // Float casts saturate: negatives go to 0, huge values to usize::MAX.
        None => n.as_f64().map_or(0, |f| f as usize),
    }
}

impl IndexQuery {
    pub fn clamped_limit(&self) -> usize {
        self.limit
            .unwrap_or(IndexConfig::DEFAULT_PAGE_SIZE)
            .clamp(IndexConfig::MIN_PAGE_SIZE, IndexConfig::MAX_PAGE_SIZE)
    }

    /// Identity of the filtered and sorted view, independent of paging.
    pub(crate) fn cache_key(&self) -> String {
        serde_json::to_string(&(&self.filters, self.sort, self.direction))
            .unwrap_or_else(|_| format!("{:?}|{:?}|{:?}", self.filters, self.sort, self.direction))
    }
}

/// Lower-cased filter needles, prepared once per query.
struct Matcher<'a> {
    filters: &'a IndexFilters,
    contains: Option<String>,
    excludes: Option<String>,
}

impl<'a> Matcher<'a> {
    fn new(filters: &'a IndexFilters) -> Self {
        Self {
            filters,
            contains: filters.contains.as_deref().map(str::to_lowercase),
            excludes: filters.excludes.as_deref().map(str::to_lowercase),
        }
    }

    fn matches(&self, row: &IndexRow) -> bool {
        let f = self.filters;

        if let Some(needle) = &self.contains {
            if !row.text.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.excludes {
            if !needle.is_empty() && row.text.contains(needle.as_str()) {
                return false;
            }
        }
        if f.can_start.is_some_and(|want| row.can_start != want) {
            return false;
        }
        if f.can_end.is_some_and(|want| row.can_end != want) {
            return false;
        }

        within(row.next_count, f.min_next, f.max_next)
            && within(row.prev_count, f.min_prev, f.max_prev)
            && f.min_len.map_or(true, |min| row.min_len >= min)
            && f.max_len.map_or(true, |max| row.max_len <= max)
    }
}

fn within(value: usize, min: Option<usize>, max: Option<usize>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Filter every segment in one pass, then stable-sort unless scan order was
/// requested.
pub(crate) fn filter_and_sort(segments: &[Arc<[IndexRow]>], query: &IndexQuery) -> Vec<IndexRow> {
    let matcher = Matcher::new(&query.filters);
    let mut rows: Vec<IndexRow> = segments
        .iter()
        .flat_map(|segment| segment.iter())
        .filter(|row| matcher.matches(row))
        .cloned()
        .collect();

    if query.sort != SortKey::Scan {
        match query.direction {
            SortDirection::Asc => rows.sort_by(|a, b| compare_rows(a, b, query.sort)),
            SortDirection::Desc => rows.sort_by(|a, b| compare_rows(b, a, query.sort)),
        }
    }
    rows
}

fn compare_rows(a: &IndexRow, b: &IndexRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Scan => Ordering::Equal,
        SortKey::Hash => compare_text(&a.hash, &b.hash),
        SortKey::Text => compare_text(&a.text, &b.text),
        SortKey::CanStart => a.can_start.cmp(&b.can_start),
        SortKey::CanEnd => a.can_end.cmp(&b.can_end),
        SortKey::NextCount => a.next_count.cmp(&b.next_count),
        SortKey::PrevCount => a.prev_count.cmp(&b.prev_count),
        SortKey::TokenCount => a.token_count.cmp(&b.token_count),
        SortKey::MinLen => a.min_len.cmp(&b.min_len),
        SortKey::MaxLen => a.max_len.cmp(&b.max_len),
    }
}

/// Case-insensitive order, falling back to bytewise order for ties.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}
