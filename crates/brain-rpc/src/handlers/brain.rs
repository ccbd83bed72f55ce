//! Learning and generation handlers.

use super::{get_str_param, require_str_param, run_blocking};
use crate::server::AppState;
use brain_core::Result;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn learn(state: &Arc<AppState>, params: &Value) -> Result<Value> {
    let text = require_str_param(params, "text", "text")?;
    let learned = run_blocking(state, move |s| s.brain.learn(&text)).await?;
    Ok(json!({ "learned": learned }))
}

pub async fn get_seed(state: &Arc<AppState>, params: &Value) -> Result<Value> {
    let text = get_str_param(params, "text", "text")
        .unwrap_or_default()
        .to_string();
    let seed = run_blocking(state, move |s| Ok(s.brain.get_seed(&text))).await?;
    Ok(json!({ "seed": seed }))
}

/// Generate a reply. Without a seed, one is drawn from the lexicon.
pub async fn generate(state: &Arc<AppState>, params: &Value) -> Result<Value> {
    let seed = get_str_param(params, "seed", "seed").map(String::from);
    run_blocking(state, move |s| {
        let seed = seed
            .or_else(|| s.brain.get_seed(""))
            .unwrap_or_default();
        let response = s.brain.get_response(&seed);
        Ok(json!({ "seed": seed, "response": response }))
    })
    .await
}

pub async fn brain_stats(state: &Arc<AppState>, _params: &Value) -> Result<Value> {
    let stats = run_blocking(state, |s| s.brain.stats()).await?;
    Ok(serde_json::to_value(stats)?)
}
