//! CSV export of validation results
//!
//! One denormalized row per result, written to the results folder under a
//! timestamped name that the download and Telegram endpoints later resolve.

use chrono::{DateTime, Utc};
use repcheck_common::{Error, Result, ValidationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    value: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    otx: &'a str,
    misp: &'a str,
    kaspersky: &'a str,
    total_malicious: u8,
    source_ip: Option<&'a str>,
    destination_ip: Option<&'a str>,
    rule: Option<&'a str>,
    severity: Option<&'a str>,
    timestamp: Option<&'a str>,
    conclusion: &'a str,
    country: Option<&'a str>,
    module: Option<&'a str>,
    error: Option<&'a str>,
}

impl<'a> From<&'a ValidationResult> for ExportRow<'a> {
    fn from(r: &'a ValidationResult) -> Self {
        Self {
            value: &r.value,
            kind: &r.kind,
            otx: &r.results.otx,
            misp: &r.results.misp,
            kaspersky: &r.results.kaspersky,
            total_malicious: r.total_malicious,
            source_ip: r.source_ip.as_deref(),
            destination_ip: r.destination_ip.as_deref(),
            rule: r.rule.as_deref(),
            severity: r.severity.as_deref(),
            timestamp: r.timestamp.as_deref(),
            conclusion: r.conclusion.as_str(),
            country: r.country.as_deref(),
            module: r.module.as_deref(),
            error: r.error.as_deref(),
        }
    }
}

/// `validation_20240131_142501_123.csv`
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("validation_{}.csv", at.format("%Y%m%d_%H%M%S_%3f"))
}

/// Write `results` to a new CSV file in `dir`
///
/// Returns the file name, or `None` when there is nothing to write.
pub fn write_csv(dir: &Path, results: &[ValidationResult]) -> Result<Option<String>> {
    if results.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(dir)?;
    let filename = export_filename(Utc::now());
    let path = dir.join(&filename);

    let mut writer = csv::Writer::from_path(&path).map_err(|e| Error::Export(e.to_string()))?;
    for result in results {
        writer
            .serialize(ExportRow::from(result))
            .map_err(|e| Error::Export(e.to_string()))?;
    }
    writer.flush()?;

    tracing::info!(file = %path.display(), rows = results.len(), "CSV export written");
    Ok(Some(filename))
}

/// Resolve a client-supplied export name inside `dir`
///
/// Only bare `.csv` file names are accepted; anything that could address a
/// path outside `dir` is rejected.
pub fn resolve_export_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("filename is required".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.starts_with('.') {
        return Err(Error::InvalidInput(format!("invalid filename: {}", name)));
    }
    if !name.to_ascii_lowercase().ends_with(".csv") {
        return Err(Error::InvalidInput(format!("not a CSV export: {}", name)));
    }
    Ok(dir.join(name))
}
