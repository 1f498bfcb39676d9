//! Validation history
//!
//! Append-only log of validation results. Rows are written once per batch in
//! a single transaction; reads return newest first with exact duplicates
//! removed (the same alert validated twice yields identical rows).

use super::retry_on_lock;
use chrono::Utc;
use repcheck_common::{HistoryRecord, Result, SourceStatuses, ValidationResult};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::time::Duration;

/// How long a batch insert waits out a locked database
const APPEND_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Persist a batch of results; returns the number of rows written
pub async fn append(pool: &SqlitePool, results: &[ValidationResult]) -> Result<u64> {
    if results.is_empty() {
        return Ok(0);
    }

    let written =
        retry_on_lock("history append", APPEND_LOCK_WAIT, || insert_batch(pool, results)).await?;

    tracing::info!(rows = written, "Validation results persisted");
    Ok(written)
}

async fn insert_batch(pool: &SqlitePool, results: &[ValidationResult]) -> Result<u64> {
    let created_at = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for result in results {
        let record = HistoryRecord::from(result);
        sqlx::query(
            r#"
            INSERT INTO validation_history (
                source_ip, destination_ip, country, rule, severity, module, timestamp,
                value, type, otx, misp, kaspersky, total_malicious, conclusion, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.source_ip)
        .bind(&record.destination_ip)
        .bind(&record.country)
        .bind(&record.rule)
        .bind(&record.severity)
        .bind(&record.module)
        .bind(&record.timestamp)
        .bind(&record.value)
        .bind(&record.kind)
        .bind(&record.results.otx)
        .bind(&record.results.misp)
        .bind(&record.results.kaspersky)
        .bind(record.total_malicious)
        .bind(&record.conclusion)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

/// Every persisted record, newest first, duplicates removed
pub async fn fetch_all(pool: &SqlitePool) -> Result<Vec<HistoryRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT source_ip, destination_ip, country, rule, severity, module, timestamp,
               value, type, otx, misp, kaspersky, total_malicious, conclusion
        FROM validation_history
        ORDER BY timestamp DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let records = rows
        .into_iter()
        .map(|row| -> std::result::Result<HistoryRecord, sqlx::Error> {
            Ok(HistoryRecord {
                source_ip: row.try_get("source_ip")?,
                destination_ip: row.try_get("destination_ip")?,
                country: row.try_get("country")?,
                rule: row.try_get("rule")?,
                severity: row.try_get("severity")?,
                module: row.try_get("module")?,
                timestamp: row.try_get("timestamp")?,
                value: row.try_get("value")?,
                kind: row.try_get("type")?,
                results: SourceStatuses {
                    otx: row.try_get("otx")?,
                    misp: row.try_get("misp")?,
                    kaspersky: row.try_get("kaspersky")?,
                },
                total_malicious: row.try_get("total_malicious")?,
                conclusion: row.try_get("conclusion")?,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(dedup_records(records))
}

/// Drop rows whose canonical serialization was already seen, keeping order
pub fn dedup_records(records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match serde_json::to_string(record) {
            Ok(canonical) => seen.insert(canonical),
            // Plain strings and integers; not reachable
            Err(_) => true,
        })
        .collect()
}

/// Delete every row; returns how many were removed
pub async fn clear(pool: &SqlitePool) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM validation_history")
        .execute(pool)
        .await?
        .rows_affected();

    tracing::info!(deleted, "Validation history cleared");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repcheck_common::ValidationEntry;

    fn record(value: &str, timestamp: &str) -> HistoryRecord {
        let mut entry = ValidationEntry::new(value);
        entry.timestamp = Some(timestamp.to_string());
        HistoryRecord::from(&ValidationResult::errored(&entry, "x"))
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_and_order() {
        let a = record("1.1.1.1", "2024-01-02");
        let b = record("2.2.2.2", "2024-01-01");

        let deduped = dedup_records(vec![a.clone(), b.clone(), a.clone(), b.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }

    #[test]
    fn test_dedup_distinguishes_any_field() {
        let a = record("1.1.1.1", "2024-01-02");
        let mut b = a.clone();
        b.rule = Some("port scan".to_string());

        assert_eq!(dedup_records(vec![a, b]).len(), 2);
    }
}
