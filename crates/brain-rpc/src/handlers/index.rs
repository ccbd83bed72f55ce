//! Secondary index handlers.

use super::{get_i64_param, require_str_param, run_blocking};
use crate::server::AppState;
use brain_core::{lookup_sequence, BrainError, IndexQuery, Result};
use serde_json::Value;
use std::sync::Arc;

/// Filtered, sorted page of sequences: `{total, offset, limit, items, index}`.
pub async fn list_sequences(state: &Arc<AppState>, params: &Value) -> Result<Value> {
    let query: IndexQuery =
        serde_json::from_value(params.clone()).map_err(|e| BrainError::InvalidParams {
            message: format!("Invalid list parameters: {}", e),
        })?;
    let page = run_blocking(state, move |s| Ok(s.index.query(&query))).await?;
    Ok(serde_json::to_value(page)?)
}

pub async fn refresh_index(state: &Arc<AppState>, _params: &Value) -> Result<Value> {
    let status = run_blocking(state, |s| {
        s.index.refresh();
        Ok(s.index.status())
    })
    .await?;
    Ok(serde_json::to_value(status)?)
}

pub async fn index_status(state: &Arc<AppState>, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.index.status())?)
}

pub async fn get_sequence(state: &Arc<AppState>, params: &Value) -> Result<Value> {
    let hash = require_str_param(params, "hash", "hash")?;
    let neighbor_limit = get_i64_param(params, "neighbor_limit", "neighborLimit")
        .map(|n| usize::try_from(n).unwrap_or(0));

    let detail = run_blocking(state, move |s| {
        lookup_sequence(s.brain.sequences(), &hash, neighbor_limit)
    })
    .await?;
    Ok(serde_json::to_value(detail)?)
}
