//! Score cache management
//!
//! Both endpoints answer 503 when the service runs without a cache.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub status: String,
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearAddressResponse {
    pub status: String,
    pub message: String,
    pub ip: String,
    pub deleted_keys: Vec<String>,
}

/// POST /clear-cache
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<ClearCacheResponse>> {
    let keys = state.ctx.cache.clear_all().await?;

    let message = if keys.is_empty() {
        "No cached scores to clear".to_string()
    } else {
        format!("Cleared {} cached scores", keys.len())
    };

    Ok(Json(ClearCacheResponse {
        status: "success".to_string(),
        message,
        count: keys.len(),
    }))
}

/// POST /clear-cache/:ip
pub async fn clear_cache_for_address(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> ApiResult<Json<ClearAddressResponse>> {
    let mut deleted_keys = state.ctx.cache.clear_address(&ip).await?;
    deleted_keys.sort();

    let message = if deleted_keys.is_empty() {
        format!("No cached scores for {}", ip)
    } else {
        format!("Cleared cached scores for {}", ip)
    };

    Ok(Json(ClearAddressResponse {
        status: "success".to_string(),
        message,
        ip,
        deleted_keys,
    }))
}

/// Build cache management routes
pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/clear-cache", post(clear_cache))
        .route("/clear-cache/:ip", post(clear_cache_for_address))
}
