//! Validation history and dashboard data

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use repcheck_common::{Conclusion, HistoryRecord};
use serde::Serialize;

use crate::db::history;
use crate::error::ApiResult;
use crate::AppState;

/// Conclusion counts over the deduplicated history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_alerts: usize,
    pub dangerous: usize,
    pub borderline: usize,
    pub benign: usize,
}

impl DashboardStats {
    /// Error records count toward `total_alerts` only
    pub fn from_records(records: &[HistoryRecord]) -> Self {
        let mut stats = DashboardStats {
            total_alerts: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.conclusion.parse::<Conclusion>() {
                Ok(Conclusion::Dangerous) => stats.dangerous += 1,
                Ok(Conclusion::Borderline) => stats.borderline += 1,
                Ok(Conclusion::Benign) => stats.benign += 1,
                _ => {}
            }
        }
        stats
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub results: Vec<HistoryRecord>,
    pub stats: DashboardStats,
    pub last_updated: String,
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub status: String,
    pub message: String,
    pub deleted: u64,
}

/// GET /api/history
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Vec<HistoryRecord>>> {
    Ok(Json(history::fetch_all(&state.db).await?))
}

/// GET /api/dashboard-data
pub async fn dashboard_data(State(state): State<AppState>) -> ApiResult<Json<DashboardResponse>> {
    let results = history::fetch_all(&state.db).await?;
    let stats = DashboardStats::from_records(&results);

    Ok(Json(DashboardResponse {
        success: true,
        results,
        stats,
        last_updated: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}

/// POST /clear-db
pub async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<ClearHistoryResponse>> {
    let deleted = history::clear(&state.db).await?;

    Ok(Json(ClearHistoryResponse {
        status: "success".to_string(),
        message: "Validation history cleared".to_string(),
        deleted,
    }))
}

/// Build history routes
pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(get_history))
        .route("/api/dashboard-data", get(dashboard_data))
        .route("/clear-db", post(clear_history))
}
