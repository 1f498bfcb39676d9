//! Test Helper Utilities
//!
//! Stub feeds, cache stores and app wiring shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use repcheck_common::{Source, SourceScore};
use repcheck_validator::cache::{CacheError, CacheStore, MemoryStore, ScoreCache};
use repcheck_validator::feeds::{FeedError, FeedSet, ReputationFeed};
use repcheck_validator::{build_router, db, AppState, ValidationContext};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TTL: Duration = Duration::from_secs(3600);

/// Programmable feed that counts its network calls
pub struct StubFeed {
    source: Source,
    default: SourceScore,
    scores: HashMap<String, SourceScore>,
    failing: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    hold: Option<Duration>,
    panic_on: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubFeed {
    pub fn new(source: Source, default: SourceScore) -> Self {
        Self {
            source,
            default,
            scores: HashMap::new(),
            failing: HashMap::new(),
            delays: HashMap::new(),
            hold: None,
            panic_on: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn score(mut self, address: &str, score: SourceScore) -> Self {
        self.scores.insert(address.to_string(), score);
        self
    }

    /// Answer `address` with an HTTP error status
    pub fn fail(mut self, address: &str, status: u16) -> Self {
        self.failing.insert(address.to_string(), status);
        self
    }

    pub fn delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    /// Keep every call in flight for `duration`
    pub fn hold(mut self, duration: Duration) -> Self {
        self.hold = Some(duration);
        self
    }

    pub fn panic_on(mut self, address: &str) -> Self {
        self.panic_on = Some(address.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReputationFeed for StubFeed {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_score(&self, address: &str) -> Result<SourceScore, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(hold) = self.hold {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }
        if self.panic_on.as_deref() == Some(address) {
            panic!("stub feed blew up on {}", address);
        }
        if let Some(status) = self.failing.get(address) {
            return Err(FeedError::Status(*status));
        }
        Ok(self.scores.get(address).copied().unwrap_or(self.default))
    }
}

/// Three stub feeds plus handles to inspect them
pub struct StubFeeds {
    pub otx: Arc<StubFeed>,
    pub misp: Arc<StubFeed>,
    pub kaspersky: Arc<StubFeed>,
}

impl StubFeeds {
    pub fn new(otx: StubFeed, misp: StubFeed, kaspersky: StubFeed) -> Self {
        Self {
            otx: Arc::new(otx),
            misp: Arc::new(misp),
            kaspersky: Arc::new(kaspersky),
        }
    }

    /// Every feed answers 0 for every address
    pub fn clean() -> Self {
        Self::new(
            StubFeed::new(Source::Otx, SourceScore::NONE),
            StubFeed::new(Source::Misp, SourceScore::NONE),
            StubFeed::new(Source::Kaspersky, SourceScore::NONE),
        )
    }

    pub fn feed_set(&self) -> FeedSet {
        FeedSet {
            otx: self.otx.clone(),
            misp: self.misp.clone(),
            kaspersky: self.kaspersky.clone(),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.otx.calls() + self.misp.calls() + self.kaspersky.calls()
    }
}

/// Cache store whose every operation fails like an unreachable server
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable)
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }
    async fn ping(&self) -> Result<(), CacheError> {
        self.fail()
    }
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.fail()
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }
    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        self.fail()
    }
    async fn delete(&self, _keys: &[String]) -> Result<u64, CacheError> {
        self.fail()
    }
}

pub fn memory_cache() -> ScoreCache {
    ScoreCache::new(Arc::new(MemoryStore::new()), Duration::from_secs(1))
}

pub fn failing_cache() -> ScoreCache {
    ScoreCache::new(Arc::new(FailingStore::new()), Duration::from_secs(1))
}

pub fn context(feeds: &StubFeeds, cache: ScoreCache, workers: usize) -> Arc<ValidationContext> {
    Arc::new(ValidationContext::new(feeds.feed_set(), cache, TTL, workers))
}

/// Temporary history database
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = db::init_database_pool(&temp_dir.path().join("history.db"))
        .await
        .expect("Failed to initialize test database");
    (temp_dir, pool)
}

/// Router over stub feeds, a temp database and a temp results folder
pub async fn create_test_app(ctx: Arc<ValidationContext>) -> (axum::Router, SqlitePool, TempDir) {
    let (temp_dir, pool) = create_test_db().await;
    let state = AppState::new(ctx, pool.clone(), temp_dir.path().join("results"), None);
    (build_router(state), pool, temp_dir)
}
