//! Reputation feed clients
//!
//! Each feed looks up one address and turns its own response schema into a
//! [`SourceScore`]. [`lookup`] puts the score cache in front of a feed and
//! is the only entry point the validator uses: it never returns an error,
//! any transport, status or decode failure scores as 0.

pub mod http;
pub mod kaspersky;
pub mod misp;
pub mod otx;

pub use http::{FeedHttp, RetryPolicy};
pub use kaspersky::KasperskyFeed;
pub use misp::MispFeed;
pub use otx::OtxFeed;

use crate::cache::ScoreCache;
use async_trait::async_trait;
use repcheck_common::config::{FeedsConfig, HttpConfig};
use repcheck_common::{ScoreTriple, Source, SourceScore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Feed lookup errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Feed returned HTTP {0}")]
    Status(u16),

    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

/// A threat-intelligence feed
#[async_trait]
pub trait ReputationFeed: Send + Sync {
    fn source(&self) -> Source;

    /// Query the feed and score the answer; no caching at this level
    async fn fetch_score(&self, address: &str) -> Result<SourceScore, FeedError>;
}

/// Counters over every lookup since startup
#[derive(Debug, Default)]
pub struct LookupStats {
    lookups: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`LookupStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookupCounts {
    pub lookups: u64,
    /// Lookups that reached the network
    pub fetches: u64,
    /// Fetches that failed and scored 0
    pub failures: u64,
}

impl LookupStats {
    pub fn snapshot(&self) -> LookupCounts {
        LookupCounts {
            lookups: self.lookups.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Cache-aside, fail-open score for one (feed, address)
pub async fn lookup(
    feed: &dyn ReputationFeed,
    cache: &ScoreCache,
    stats: &LookupStats,
    address: &str,
    ttl: Duration,
) -> SourceScore {
    let source = feed.source();
    stats.lookups.fetch_add(1, Ordering::Relaxed);

    cache
        .get_or_compute(source, address, ttl, || async move {
            stats.fetches.fetch_add(1, Ordering::Relaxed);
            match feed.fetch_score(address).await {
                Ok(score) => {
                    debug!(source = %source, address, score = score.value(), "Feed scored address");
                    Some(score)
                }
                Err(e) => {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        source = %source,
                        address,
                        error = %e,
                        "Feed lookup failed, scoring as no finding"
                    );
                    None
                }
            }
        })
        .await
        .unwrap_or(SourceScore::NONE)
}

/// The three feeds every address is checked against
#[derive(Clone)]
pub struct FeedSet {
    pub otx: Arc<dyn ReputationFeed>,
    pub misp: Arc<dyn ReputationFeed>,
    pub kaspersky: Arc<dyn ReputationFeed>,
}

impl FeedSet {
    /// Build the production feeds sharing one pooled client
    ///
    /// MISP gets its own client when TLS verification is turned off for it.
    pub fn from_config(
        feeds: &FeedsConfig,
        http_config: &HttpConfig,
        pool_size: usize,
    ) -> Result<Self, FeedError> {
        let retry = RetryPolicy::from(http_config);
        let shared = FeedHttp::new(pool_size, retry)?;
        let misp_http = if feeds.misp.verify_tls {
            shared.clone()
        } else {
            FeedHttp::insecure(pool_size, retry)?
        };

        Ok(Self {
            otx: Arc::new(OtxFeed::new(&feeds.otx, shared.clone())),
            misp: Arc::new(MispFeed::new(&feeds.misp, misp_http)),
            kaspersky: Arc::new(KasperskyFeed::new(&feeds.kaspersky, shared)),
        })
    }

    /// Score an address on all three feeds concurrently
    pub async fn score_all(
        &self,
        cache: &ScoreCache,
        stats: &LookupStats,
        address: &str,
        ttl: Duration,
    ) -> ScoreTriple {
        let (otx, misp, kaspersky) = tokio::join!(
            lookup(self.otx.as_ref(), cache, stats, address, ttl),
            lookup(self.misp.as_ref(), cache, stats, address, ttl),
            lookup(self.kaspersky.as_ref(), cache, stats, address, ttl),
        );
        ScoreTriple::new(otx, misp, kaspersky)
    }
}
