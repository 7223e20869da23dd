//! `/api/v1/cache[/stats]` — response cache introspection and manual clear
//! (§3 Cache Entry, §4.3).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::domain::Result;

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub max_size: usize,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<CacheStatsResponse>> {
    let stats = state.cache.stats().await;
    crate::observability::metrics::record_cache_hit_rate(stats.hit_rate());
    Ok(Json(CacheStatsResponse {
        hits: stats.hits,
        misses: stats.misses,
        hit_rate: stats.hit_rate(),
        size: stats.size,
        max_size: stats.max_size,
    }))
}

pub async fn clear(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.cache.clear().await;
    Ok(Json(serde_json::json!({ "success": true })))
}
