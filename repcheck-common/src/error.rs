//! Common error types for repcheck

use thiserror::Error;

/// Common result type for repcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the repcheck crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Flat-file export failure
    #[error("Export error: {0}")]
    Export(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
