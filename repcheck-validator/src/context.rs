//! Validation context
//!
//! Everything a validation run needs (feeds, score cache, lookup counters,
//! policy values), built once at startup and shared behind an `Arc`.

use crate::cache::{connect_cache, ScoreCache};
use crate::feeds::{FeedError, FeedSet, LookupStats};
use repcheck_common::config::TomlConfig;
use std::time::Duration;
use tracing::info;

pub struct ValidationContext {
    pub feeds: FeedSet,
    pub cache: ScoreCache,
    pub stats: LookupStats,
    /// Lifetime of a cached score
    pub cache_ttl: Duration,
    /// Concurrent entries per batch
    pub worker_count: usize,
}

impl ValidationContext {
    pub fn new(feeds: FeedSet, cache: ScoreCache, cache_ttl: Duration, worker_count: usize) -> Self {
        Self {
            feeds,
            cache,
            stats: LookupStats::default(),
            cache_ttl,
            worker_count: worker_count.max(1),
        }
    }

    /// Connect the configured cache backend and build the production feeds
    ///
    /// A cache that cannot be reached leaves the context uncached; only a
    /// feed HTTP client that cannot be built is an error.
    pub async fn from_config(config: &TomlConfig) -> Result<Self, FeedError> {
        let worker_count = config.validator.worker_count();
        let cache = connect_cache(&config.cache).await;
        let feeds = FeedSet::from_config(&config.feeds, &config.http, worker_count)?;

        info!(
            worker_count,
            cache_backend = cache.backend(),
            cache_ttl_secs = config.cache.ttl_seconds,
            "Validation context ready"
        );

        Ok(Self::new(
            feeds,
            cache,
            Duration::from_secs(config.cache.ttl_seconds),
            worker_count,
        ))
    }

    /// Log final lookup counters
    pub fn shutdown(&self) {
        let counts = self.stats.snapshot();
        info!(
            lookups = counts.lookups,
            fetches = counts.fetches,
            failures = counts.failures,
            "Validation context shut down"
        );
    }
}
