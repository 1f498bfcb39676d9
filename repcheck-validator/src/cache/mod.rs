//! Score cache
//!
//! Advisory (source, address) → score cache in front of the reputation
//! feeds. The cache is never required for correctness: read failures are
//! reported as misses, write failures are skipped, and both are logged at
//! `warn` so the caller proceeds with a direct fetch.
//!
//! Keys follow `{source}_ip:{address}` with the score stored as a decimal
//! string and expiry handled by the store (`SETEX`).

pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use repcheck_common::config::{CacheBackend, CacheConfig};
use repcheck_common::{Source, SourceScore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Cache store errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store is not available")]
    Unavailable,

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key/value store with per-key expiry and glob scanning
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for diagnostics ("redis", "memory")
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// All live keys matching a Redis-style glob
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;
}

/// Score cache handle shared by all workers
#[derive(Clone)]
pub struct ScoreCache {
    store: Option<Arc<dyn CacheStore>>,
    op_timeout: Duration,
}

impl ScoreCache {
    pub fn new(store: Arc<dyn CacheStore>, op_timeout: Duration) -> Self {
        Self {
            store: Some(store),
            op_timeout,
        }
    }

    /// Cache that always misses; lookups go straight to the feeds
    pub fn disabled() -> Self {
        Self {
            store: None,
            op_timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map(|s| s.backend()).unwrap_or("disabled")
    }

    async fn timed<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    /// Cached score, or `None` on miss, store failure or corrupt value
    pub async fn get(&self, source: Source, address: &str) -> Option<SourceScore> {
        let store = self.store.as_ref()?;
        let key = source.cache_key(address);

        match self.timed(store.get(&key)).await {
            Ok(Some(raw)) => match raw.parse::<SourceScore>() {
                Ok(score) => {
                    debug!(source = %source, address, score = score.value(), "Score cache hit");
                    Some(score)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring unreadable cached score");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(
                    source = %source,
                    address,
                    error = %e,
                    "Score cache read failed, fetching directly"
                );
                None
            }
        }
    }

    /// Best-effort write; failures are logged and otherwise ignored
    pub async fn set(&self, source: Source, address: &str, score: SourceScore, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = source.cache_key(address);
        let value = score.value().to_string();

        match self.timed(store.set_ex(&key, &value, ttl)).await {
            Ok(()) => debug!(source = %source, address, "Score cached"),
            Err(e) => warn!(
                source = %source,
                address,
                error = %e,
                "Score cache write skipped"
            ),
        }
    }

    /// Cache-aside read
    ///
    /// Returns the cached score without calling `compute` on a hit. On a miss
    /// runs `compute`; a `Some` score is written back and returned, a `None`
    /// (failed fetch) is passed through and never cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        source: Source,
        address: &str,
        ttl: Duration,
        compute: F,
    ) -> Option<SourceScore>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<SourceScore>>,
    {
        if let Some(score) = self.get(source, address).await {
            return Some(score);
        }

        let score = compute().await?;
        self.set(source, address, score, ttl).await;
        Some(score)
    }

    /// Delete every cached score for every source
    pub async fn clear_all(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for source in Source::ALL {
            keys.extend(self.scan(&source.cache_pattern()).await?);
        }
        self.delete(keys).await
    }

    /// Delete the cached scores of one address across all sources
    pub async fn clear_address(&self, address: &str) -> Result<Vec<String>, CacheError> {
        let pattern = format!("*_ip:{}", escape_glob(address));
        let keys = self.scan(&pattern).await?;
        self.delete(keys).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let store = self.store.as_ref().ok_or(CacheError::Unavailable)?;
        self.timed(store.scan(pattern)).await
    }

    async fn delete(&self, keys: Vec<String>) -> Result<Vec<String>, CacheError> {
        let store = self.store.as_ref().ok_or(CacheError::Unavailable)?;
        if keys.is_empty() {
            return Ok(keys);
        }
        let deleted = self.timed(store.delete(&keys)).await?;
        info!(matched = keys.len(), deleted, "Score cache entries cleared");
        Ok(keys)
    }

    /// Reachability check for `/health`
    pub async fn ping(&self) -> Result<(), CacheError> {
        let store = self.store.as_ref().ok_or(CacheError::Unavailable)?;
        self.timed(store.ping()).await
    }
}

/// Escape glob metacharacters so a value matches only itself
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the score cache selected by configuration
///
/// A Redis backend that cannot be reached after the configured attempts
/// leaves the service running uncached.
pub async fn connect_cache(config: &CacheConfig) -> ScoreCache {
    let op_timeout = Duration::from_millis(config.operation_timeout_ms);

    match config.backend {
        CacheBackend::Disabled => {
            warn!("Score cache disabled by configuration, every lookup hits the feeds");
            ScoreCache::disabled()
        }
        CacheBackend::Memory => {
            info!("Using in-process score cache");
            ScoreCache::new(Arc::new(MemoryStore::new()), op_timeout)
        }
        CacheBackend::Redis => {
            let retry_delay = Duration::from_millis(config.connect_retry_delay_ms);
            match RedisStore::connect(&config.redis_url, config.connect_attempts, retry_delay).await
            {
                Ok(store) => ScoreCache::new(Arc::new(store), op_timeout),
                Err(e) => {
                    error!(
                        error = %e,
                        "Redis unavailable after {} attempts, running without score cache",
                        config.connect_attempts
                    );
                    ScoreCache::disabled()
                }
            }
        }
    }
}
