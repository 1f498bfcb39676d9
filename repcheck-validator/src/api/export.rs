//! CSV export download and Telegram delivery

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};
use crate::export::resolve_export_path;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TelegramResponse {
    pub status: String,
    pub message: String,
    pub filename: String,
}

/// Resolve `?filename=` to an existing export file
async fn existing_export(state: &AppState, query: &ExportQuery) -> ApiResult<(String, PathBuf)> {
    let filename = query
        .filename
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("parameter 'filename' is required".to_string()))?;
    let path = resolve_export_path(&state.results_dir, filename)?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::NotFound(format!("export {} not found", filename)));
    }
    Ok((filename.trim().to_string(), path))
}

/// GET /download-csv?filename=
pub async fn download_csv(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let (filename, path) = existing_export(&state, &query).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read export: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

/// GET /send-csv-to-telegram?filename=
pub async fn send_csv_to_telegram(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Json<TelegramResponse>> {
    let telegram = state
        .telegram
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Telegram delivery is not configured".to_string()))?;
    let (filename, path) = existing_export(&state, &query).await?;

    if let Err(e) = telegram.send_document(&path).await {
        tracing::error!(file = %filename, error = %e, "Telegram delivery failed");
        state.record_error(format!("telegram delivery failed: {}", e)).await;
        return Err(e.into());
    }

    Ok(Json(TelegramResponse {
        status: "success".to_string(),
        message: format!("Sent {} to Telegram", filename),
        filename,
    }))
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/download-csv", get(download_csv))
        .route("/send-csv-to-telegram", get(send_csv_to_telegram))
}
