//! Health check endpoint
//!
//! Reports uptime, build info, score cache reachability and lookup
//! counters. The service is "degraded" while it runs without a reachable
//! cache; validation still works, only slower.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::feeds::LookupCounts;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    /// "redis", "memory" or "disabled"
    pub backend: &'static str,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub uptime_seconds: u64,
    pub worker_count: usize,
    pub cache: CacheHealth,
    pub lookups: LookupCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let cache = &state.ctx.cache;
    let cache_health = match cache.ping().await {
        Ok(()) => CacheHealth {
            backend: cache.backend(),
            reachable: true,
            error: None,
        },
        Err(e) => CacheHealth {
            backend: cache.backend(),
            reachable: false,
            error: Some(e.to_string()),
        },
    };

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if cache_health.reachable { "ok" } else { "degraded" }.to_string(),
        module: "repcheck-validator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        uptime_seconds,
        worker_count: state.ctx.worker_count,
        cache: cache_health,
        lookups: state.ctx.stats.snapshot(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
