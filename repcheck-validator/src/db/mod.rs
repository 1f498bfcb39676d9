//! Database access for repcheck-validator
//!
//! Validation history lives in a single SQLite file under the results
//! folder.

pub mod history;

use repcheck_common::{Error, Result};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

/// Initialize database connection pool
///
/// Creates the file and its parent directory when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the history table if it doesn't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS validation_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_ip TEXT,
            destination_ip TEXT,
            country TEXT,
            rule TEXT,
            severity TEXT,
            module TEXT,
            timestamp TEXT,
            value TEXT NOT NULL,
            type TEXT NOT NULL,
            otx TEXT NOT NULL,
            misp TEXT NOT NULL,
            kaspersky TEXT NOT NULL,
            total_malicious INTEGER NOT NULL DEFAULT 0,
            conclusion TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_validation_history_timestamp ON validation_history (timestamp)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (validation_history)");

    Ok(())
}

/// Retry a database operation while SQLite reports the file as locked
///
/// Backoff starts at 10 ms and doubles up to 1 s; any other error, or a lock
/// that outlasts `max_wait`, is returned.
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    let mut backoff = Duration::from_millis(10);

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }
                if started.elapsed() >= max_wait {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        max_wait_ms = max_wait.as_millis() as u64,
                        "Database still locked, giving up"
                    );
                    return Err(err);
                }
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Database locked, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
        }
    }
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}
