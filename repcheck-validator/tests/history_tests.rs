//! Validation history persistence: append, deduplicated newest-first reads,
//! clear

mod helpers;

use helpers::create_test_db;
use repcheck_common::{Conclusion, ScoreTriple, SourceScore, ValidationEntry, ValidationResult};
use repcheck_validator::db::history;

fn result(address: &str, timestamp: Option<&str>, otx: SourceScore) -> ValidationResult {
    let mut entry = ValidationEntry::new(address);
    entry.timestamp = timestamp.map(String::from);
    entry.rule = Some("port scan".to_string());
    let scores = ScoreTriple::new(otx, SourceScore::NONE, SourceScore::NONE);
    let total = scores.total();
    ValidationResult::scored(&entry, &scores, total, Conclusion::from_total(total))
}

#[tokio::test]
async fn test_identical_records_read_back_once() {
    let (_dir, pool) = create_test_db().await;
    let r = result("1.1.1.1", Some("2024-05-01T10:00:00Z"), SourceScore::WEAK);

    assert_eq!(history::append(&pool, &[r.clone()]).await.unwrap(), 1);
    assert_eq!(history::append(&pool, &[r.clone()]).await.unwrap(), 1);

    let records = history::fetch_all(&pool).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "1.1.1.1");
    assert_eq!(records[0].conclusion, "borderline");
    assert_eq!(records[0].total_malicious, 1);
    assert_eq!(records[0].results.otx, "suspicious");

    // Dedup happens on read only
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM validation_history")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 2);
}

#[tokio::test]
async fn test_newest_first_ties_by_insertion() {
    let (_dir, pool) = create_test_db().await;
    let older = result("1.1.1.1", Some("2024-05-01T09:00:00Z"), SourceScore::NONE);
    let newer = result("2.2.2.2", Some("2024-05-01T11:00:00Z"), SourceScore::NONE);
    let tie_first = result("3.3.3.3", Some("2024-05-01T10:00:00Z"), SourceScore::NONE);
    let tie_second = result("4.4.4.4", Some("2024-05-01T10:00:00Z"), SourceScore::NONE);

    history::append(&pool, &[older, newer]).await.unwrap();
    history::append(&pool, &[tie_first, tie_second]).await.unwrap();

    let order: Vec<String> = history::fetch_all(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.value)
        .collect();
    assert_eq!(order, vec!["2.2.2.2", "4.4.4.4", "3.3.3.3", "1.1.1.1"]);
}

#[tokio::test]
async fn test_error_results_persist_without_message() {
    let (_dir, pool) = create_test_db().await;
    let errored = ValidationResult::errored(&ValidationEntry::new("bogus"), "invalid IP address");

    history::append(&pool, &[errored]).await.unwrap();

    let records = history::fetch_all(&pool).await.unwrap();
    assert_eq!(records[0].conclusion, "error");
    assert_eq!(records[0].results.misp, "error");
    let json = serde_json::to_value(&records[0]).unwrap();
    assert!(json.get("error").is_none());
    assert_eq!(json["type"], "ip");
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let (_dir, pool) = create_test_db().await;
    let batch = vec![
        result("1.1.1.1", None, SourceScore::NONE),
        result("2.2.2.2", None, SourceScore::STRONG),
    ];
    history::append(&pool, &batch).await.unwrap();

    assert_eq!(history::clear(&pool).await.unwrap(), 2);
    assert!(history::fetch_all(&pool).await.unwrap().is_empty());
    assert_eq!(history::clear(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_append_is_a_no_op() {
    let (_dir, pool) = create_test_db().await;
    assert_eq!(history::append(&pool, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_closed_pool_reports_error() {
    let (_dir, pool) = create_test_db().await;
    pool.close().await;

    let r = result("1.1.1.1", None, SourceScore::NONE);
    assert!(history::append(&pool, &[r]).await.is_err());
    assert!(history::fetch_all(&pool).await.is_err());
}
