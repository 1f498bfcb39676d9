//! Integration tests for repcheck-validator API endpoints

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use helpers::*;
use http_body_util::BodyExt;
use repcheck_common::{Source, SourceScore};
use repcheck_validator::cache::ScoreCache;
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn mixed_feeds() -> StubFeeds {
    StubFeeds::new(
        StubFeed::new(Source::Otx, SourceScore::NONE).score("6.6.6.6", SourceScore::STRONG),
        StubFeed::new(Source::Misp, SourceScore::NONE),
        StubFeed::new(Source::Kaspersky, SourceScore::NONE).score("5.5.5.5", SourceScore::WEAK),
    )
}

#[tokio::test]
async fn test_health_endpoint() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, json) = call(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "repcheck-validator");
    assert_eq!(json["cache"]["backend"], "memory");
    assert_eq!(json["cache"]["reachable"], true);
    assert_eq!(json["worker_count"], 2);
}

#[tokio::test]
async fn test_health_degraded_without_cache() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, ScoreCache::disabled(), 2)).await;

    let (status, json) = call(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["cache"]["backend"], "disabled");
}

#[tokio::test]
async fn test_validate_persists_and_history_reads_back() {
    let feeds = mixed_feeds();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 4)).await;

    let (status, json) = call(
        &app,
        "POST",
        "/validate-ip",
        Some(json!({"entries": [
            {"source_ip": "6.6.6.6", "destination_ip": "10.0.0.1", "rule": "c2 beacon", "timestamp": "2024-05-01T10:00:00Z"},
            {"source_ip": "5.5.5.5", "timestamp": "2024-05-01T11:00:00Z"},
            {"source_ip": "1.1.1.1", "timestamp": "2024-05-01T09:00:00Z"}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["worker_count"], 4);
    assert_eq!(json["persisted"], 3);
    assert!(json["elapsed_time"].as_str().unwrap().ends_with("seconds"));
    assert!(json["resources"]["before"]["timestamp"].is_string());
    assert!(json.get("export_file").is_none());

    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["value"], "6.6.6.6");
    assert_eq!(results[0]["conclusion"], "dangerous");
    assert_eq!(results[0]["destination_ip"], "10.0.0.1");
    assert_eq!(results[1]["conclusion"], "borderline");
    assert_eq!(results[1]["results"]["kaspersky"], "suspicious");
    assert_eq!(results[2]["conclusion"], "benign");

    let (status, history) = call(&app, "GET", "/api/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["5.5.5.5", "6.6.6.6", "1.1.1.1"]);
}

#[tokio::test]
async fn test_validate_without_persist() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, json) = call(
        &app,
        "POST",
        "/validate-ip",
        Some(json!({"ips": ["1.1.1.1"], "persist": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["persisted"], 0);

    let (_, history) = call(&app, "GET", "/api/history", None).await;
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn test_malformed_batch_rejected_before_any_lookup() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, json) = call(
        &app,
        "POST",
        "/validate-ip",
        Some(json!({"entries": [{"source_ip": "1.1.1.1"}, {"rule": "no address"}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert_eq!(feeds.total_calls(), 0);

    let (status, _) = call(&app, "POST", "/validate-ip", Some(json!({"entries": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_persist_failure_still_returns_results() {
    let feeds = StubFeeds::clean();
    let (app, pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;
    pool.close().await;

    let (status, json) = call(
        &app,
        "POST",
        "/validate-ip",
        Some(json!({"entries": [{"source_ip": "1.1.1.1"}]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["results"][0]["conclusion"], "benign");
    assert!(json["persist_error"].is_string());

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert!(health["last_error"].as_str().unwrap().contains("persist"));
}

#[tokio::test]
async fn test_export_and_download() {
    let feeds = mixed_feeds();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, json) = call(
        &app,
        "POST",
        "/validate-ip",
        Some(json!({"entries": [{"source_ip": "6.6.6.6"}], "save_csv": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let filename = json["export_file"].as_str().unwrap().to_string();
    assert!(filename.starts_with("validation_") && filename.ends_with(".csv"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/download-csv?filename={}", filename))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("value,type,otx,misp,kaspersky"));
    assert!(text.contains("6.6.6.6,ip,malicious,clean,clean,2"));
}

#[tokio::test]
async fn test_download_rejects_bad_names() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, _) = call(&app, "GET", "/download-csv", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/download-csv?filename=..%2Fhistory.db", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(&app, "GET", "/download-csv?filename=validation_missing.csv", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_telegram_unconfigured() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;

    let (status, json) = call(&app, "GET", "/send-csv-to-telegram?filename=validation_x.csv", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let feeds = mixed_feeds();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;
    let body = json!({"ips": ["6.6.6.6", "5.5.5.5"], "persist": false});

    call(&app, "POST", "/validate-ip", Some(body.clone())).await;
    assert_eq!(feeds.total_calls(), 6);

    let (status, json) = call(&app, "POST", "/clear-cache/6.6.6.6", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ip"], "6.6.6.6");
    assert_eq!(
        json["deleted_keys"],
        json!(["kaspersky_ip:6.6.6.6", "misp_ip:6.6.6.6", "otx_ip:6.6.6.6"])
    );

    call(&app, "POST", "/validate-ip", Some(body.clone())).await;
    assert_eq!(feeds.total_calls(), 9, "only the cleared address is refetched");

    let (status, json) = call(&app, "POST", "/clear-cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 6);

    let (_, json) = call(&app, "POST", "/clear-cache", None).await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_clear_cache_without_cache_is_unavailable() {
    let feeds = StubFeeds::clean();
    let (app, _pool, _dir) = create_test_app(context(&feeds, ScoreCache::disabled(), 2)).await;

    let (status, _) = call(&app, "POST", "/clear-cache", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = call(&app, "POST", "/clear-cache/1.1.1.1", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_dashboard_and_clear_db() {
    let feeds = mixed_feeds();
    let (app, _pool, _dir) = create_test_app(context(&feeds, memory_cache(), 2)).await;
    let body = json!({"entries": [
        {"source_ip": "6.6.6.6", "timestamp": "t1"},
        {"source_ip": "5.5.5.5", "timestamp": "t2"},
        {"source_ip": "1.1.1.1", "timestamp": "t3"},
        {"source_ip": "not-an-ip", "timestamp": "t4"}
    ]});

    // Same batch twice: history dedups on read
    call(&app, "POST", "/validate-ip", Some(body.clone())).await;
    call(&app, "POST", "/validate-ip", Some(body)).await;

    let (status, json) = call(&app, "GET", "/api/dashboard-data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        json["stats"],
        json!({"total_alerts": 4, "dangerous": 1, "borderline": 1, "benign": 1})
    );
    assert_eq!(json["results"].as_array().unwrap().len(), 4);

    let (status, json) = call(&app, "POST", "/clear-db", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 8);

    let (_, json) = call(&app, "GET", "/api/dashboard-data", None).await;
    assert_eq!(json["stats"]["total_alerts"], 0);
}
