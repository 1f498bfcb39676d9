//! Batch validator
//!
//! Fans a batch of entries out to a bounded set of tokio tasks, each scoring
//! one address on every feed, and gathers the results back into input
//! order. A failing entry (bad address, panicked task) yields an error
//! result in its own slot; it never aborts the batch.

use crate::context::ValidationContext;
use crate::fusion::fuse;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use repcheck_common::{ValidationEntry, ValidationResult};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pool state captured around a batch
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub worker_count: usize,
}

/// Results of one batch, in input order
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<ValidationResult>,
    pub elapsed: Duration,
    pub worker_count: usize,
    pub before: ResourceSnapshot,
    pub after: ResourceSnapshot,
}

pub struct BatchValidator {
    ctx: Arc<ValidationContext>,
}

impl BatchValidator {
    pub fn new(ctx: Arc<ValidationContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ValidationContext> {
        &self.ctx
    }

    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: Utc::now(),
            worker_count: self.ctx.worker_count,
        }
    }

    /// Validate every entry; `results[i]` always belongs to `entries[i]`
    pub async fn validate_batch(&self, entries: Vec<ValidationEntry>) -> BatchOutcome {
        let worker_count = self.ctx.worker_count;
        let total = entries.len();
        let before = self.snapshot();
        let started = Instant::now();

        info!(entries = total, worker_count, "Batch validation started");

        // Pre-filled so a slot that never reports back still holds an error
        let mut slots: Vec<ValidationResult> = entries
            .iter()
            .map(|entry| ValidationResult::errored(entry, "validation did not complete"))
            .collect();

        let completed: Vec<_> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| {
                let ctx = self.ctx.clone();
                let task_entry = entry.clone();
                let handle = tokio::spawn(async move { validate_entry(&ctx, &task_entry).await });
                async move { (index, entry, handle.await) }
            })
            .buffer_unordered(worker_count)
            .collect()
            .await;

        for (index, entry, joined) in completed {
            slots[index] = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        entry_index = index,
                        address = %entry.address,
                        error = %e,
                        "Validation task failed"
                    );
                    ValidationResult::errored(&entry, format!("validation task failed: {}", e))
                }
            };
        }

        let elapsed = started.elapsed();
        let errors = slots.iter().filter(|r| r.is_error()).count();
        info!(
            entries = total,
            errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch validation completed"
        );

        BatchOutcome {
            results: slots,
            elapsed,
            worker_count,
            before,
            after: self.snapshot(),
        }
    }
}

/// Score one entry on all feeds and fuse the scores
///
/// An address that does not parse as IPv4 or IPv6 is reported as an error
/// result without any feed or cache access.
pub async fn validate_entry(ctx: &ValidationContext, entry: &ValidationEntry) -> ValidationResult {
    let ip: IpAddr = match entry.address.trim().parse() {
        Ok(ip) => ip,
        Err(_) => {
            warn!(address = %entry.address, "Rejecting entry with invalid IP address");
            return ValidationResult::errored(
                entry,
                format!("invalid IP address: {:?}", entry.address),
            );
        }
    };
    let address = ip.to_string();

    let scores = ctx
        .feeds
        .score_all(&ctx.cache, &ctx.stats, &address, ctx.cache_ttl)
        .await;
    let fusion = fuse(&scores);

    debug!(
        address = %address,
        otx = scores.otx.value(),
        misp = scores.misp.value(),
        kaspersky = scores.kaspersky.value(),
        total = fusion.total,
        conclusion = %fusion.conclusion,
        "Entry validated"
    );

    ValidationResult::scored(entry, &scores, fusion.total, fusion.conclusion)
}
