//! POST /validate-ip
//!
//! Accepts a batch of alert entries, validates every address against the
//! feeds and returns the results in request order. The request is checked
//! as a whole before any lookup starts; a malformed batch is a 400.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use repcheck_common::{ValidationEntry, ValidationResult};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info};

use crate::db::history;
use crate::error::{ApiError, ApiResult};
use crate::export;
use crate::validator::ResourceSnapshot;
use crate::AppState;

/// Parsed `/validate-ip` request
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRequest {
    pub entries: Vec<ValidationEntry>,
    /// Write a CSV export (`export` or `save_csv`)
    pub export: bool,
    /// Append results to the history (default on)
    pub persist: bool,
}

#[derive(Debug, Serialize)]
pub struct Resources {
    pub before: ResourceSnapshot,
    pub after: ResourceSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub results: Vec<ValidationResult>,
    /// e.g. "1.27 seconds"
    pub elapsed_time: String,
    pub elapsed_seconds: f64,
    pub worker_count: usize,
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_error: Option<String>,
    pub persisted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// Parse a raw request body
///
/// The body is a JSON object carrying the batch under `entries` (or `ips`),
/// either as an array or as a string holding a JSON array. Array items are
/// entry objects or bare address strings. A leading byte-order mark and
/// surrounding whitespace are tolerated.
pub fn parse_request(body: &[u8]) -> Result<ValidateRequest, ApiError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ApiError::BadRequest("request body is not valid UTF-8".to_string()))?;
    let text = text.trim().trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("no data received".to_string()));
    }

    let data: Value = serde_json::from_str(text)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON format: {}", e)))?;
    let object = data
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("request body must be a JSON object".to_string()))?;

    let raw_entries = match object.get("entries") {
        Some(v) if !is_empty_value(v) => v.clone(),
        _ => object.get("ips").cloned().unwrap_or(Value::Null),
    };
    let raw_entries = match raw_entries {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|_| ApiError::BadRequest("invalid entries format".to_string()))?,
        other => other,
    };

    let items = match raw_entries {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(ApiError::BadRequest(
                "field 'entries' must be a non-empty list".to_string(),
            ))
        }
    };

    let entries = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_entry(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidateRequest {
        entries,
        export: flag(object.get("export")).or(flag(object.get("save_csv"))).unwrap_or(false),
        persist: flag(object.get("persist")).unwrap_or(true),
    })
}

fn parse_entry(index: usize, item: Value) -> Result<ValidationEntry, ApiError> {
    let entry = match item {
        Value::String(address) => ValidationEntry::new(address),
        Value::Object(_) => serde_json::from_value::<ValidationEntry>(item)
            .map_err(|e| ApiError::BadRequest(format!("entry {}: {}", index, e)))?,
        _ => {
            return Err(ApiError::BadRequest(format!(
                "entry {}: every entry must be an object",
                index
            )))
        }
    };
    entry
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("entry {}: {}", index, e)))?;
    Ok(entry)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn flag(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

/// POST /validate-ip
pub async fn validate_ips(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ValidateResponse>> {
    let request = parse_request(&body)?;
    info!(
        entries = request.entries.len(),
        export = request.export,
        persist = request.persist,
        "Validation request accepted"
    );

    let outcome = state.validator.validate_batch(request.entries).await;

    let (persisted, persist_error) = if request.persist {
        match history::append(&state.db, &outcome.results).await {
            Ok(rows) => (rows, None),
            Err(e) => {
                error!(error = %e, "Failed to persist validation results");
                state.record_error(format!("persist failed: {}", e)).await;
                (0, Some(e.to_string()))
            }
        }
    } else {
        (0, None)
    };

    let (export_file, export_error) = if request.export {
        match write_export(state.results_dir.as_ref().clone(), outcome.results.clone()).await {
            Ok(file) => (file, None),
            Err(e) => {
                error!(error = %e, "Failed to write CSV export");
                state.record_error(format!("export failed: {}", e)).await;
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };

    let elapsed_seconds = outcome.elapsed.as_secs_f64();
    Ok(Json(ValidateResponse {
        success: true,
        results: outcome.results,
        elapsed_time: format!("{:.2} seconds", elapsed_seconds),
        elapsed_seconds,
        worker_count: outcome.worker_count,
        resources: Resources {
            before: outcome.before,
            after: outcome.after,
        },
        export_file,
        export_error,
        persisted,
        persist_error,
    }))
}

async fn write_export(dir: PathBuf, results: Vec<ValidationResult>) -> Result<Option<String>, ApiError> {
    tokio::task::spawn_blocking(move || export::write_csv(&dir, &results))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

/// Build validation routes
pub fn validate_routes() -> Router<AppState> {
    Router::new().route("/validate-ip", post(validate_ips))
}
