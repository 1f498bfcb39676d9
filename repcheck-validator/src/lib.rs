//! repcheck-validator library interface
//!
//! Exposes the validation pipeline and HTTP router for the binary and for
//! integration testing.

pub mod api;
pub mod cache;
pub mod context;
pub mod db;
pub mod error;
pub mod export;
pub mod feeds;
pub mod fusion;
pub mod telegram;
pub mod validator;

pub use crate::context::ValidationContext;
pub use crate::error::{ApiError, ApiResult};
pub use crate::validator::{BatchOutcome, BatchValidator};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use telegram::TelegramClient;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ValidationContext>,
    pub validator: Arc<BatchValidator>,
    /// Validation history database
    pub db: SqlitePool,
    /// Folder holding CSV exports
    pub results_dir: Arc<PathBuf>,
    /// `None` when no bot token / chat id is configured
    pub telegram: Option<TelegramClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        ctx: Arc<ValidationContext>,
        db: SqlitePool,
        results_dir: PathBuf,
        telegram: Option<TelegramClient>,
    ) -> Self {
        Self {
            validator: Arc::new(BatchValidator::new(ctx.clone())),
            ctx,
            db,
            results_dir: Arc::new(results_dir),
            telegram,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::validate_routes())
        .merge(api::cache_routes())
        .merge(api::history_routes())
        .merge(api::export_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
