//! repcheck-validator - IP reputation validation service
//!
//! Validates batches of alert addresses against OTX, MISP and Kaspersky
//! OpenTIP, caches per-feed scores in Redis and keeps a history of results
//! in SQLite.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use repcheck_common::config::{load_config, LoggingConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repcheck_validator::telegram::TelegramClient;
use repcheck_validator::{build_router, db, AppState, ValidationContext};

/// Command-line arguments for repcheck-validator
#[derive(Parser, Debug)]
#[command(name = "repcheck-validator")]
#[command(about = "IP reputation validation service")]
#[command(version)]
struct Args {
    /// Configuration file (else REPCHECK_CONFIG, else ./repcheck.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "REPCHECK_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides server.host)
    #[arg(long, env = "REPCHECK_HOST")]
    host: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    init_tracing(&config.logging)?;

    info!("Starting repcheck-validator");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Build info"
    );

    // Results folder holds the history database and CSV exports
    let results_dir = config.storage.resolve_root_folder();
    std::fs::create_dir_all(&results_dir)
        .with_context(|| format!("Failed to create results folder {}", results_dir.display()))?;
    info!("Results folder: {}", results_dir.display());

    let db_path = config.storage.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open history database")?;
    info!("Database connection established");

    let ctx = Arc::new(
        ValidationContext::from_config(&config)
            .await
            .context("Failed to initialize validation context")?,
    );

    let telegram = TelegramClient::from_config(&config.telegram);
    if telegram.is_none() {
        warn!("Telegram token or chat id not configured, export delivery disabled");
    }

    let state = AppState::new(ctx.clone(), db_pool.clone(), results_dir, telegram);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    ctx.shutdown();
    db_pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
