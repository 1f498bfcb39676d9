//! # repcheck Common Library
//!
//! Shared code for the repcheck crates:
//! - Error and result types
//! - Bootstrap configuration (TOML + environment overrides)
//! - Validation data model (entries, scores, conclusions, results)

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    Conclusion, HistoryRecord, ScoreTriple, Source, SourceScore, SourceStatuses,
    ValidationEntry, ValidationResult,
};
