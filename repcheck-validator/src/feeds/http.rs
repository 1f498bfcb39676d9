//! Shared outbound HTTP plumbing for the feed clients
//!
//! One pooled `reqwest::Client` is shared by every worker; its idle pool per
//! host is sized to the worker count to bound socket usage. Transient
//! failures (transport errors, 429 and 5xx gateway statuses) are retried
//! with exponential backoff.

use super::FeedError;
use repcheck_common::config::HttpConfig;
use repcheck_common::Source;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("repcheck/", env!("CARGO_PKG_VERSION"));

/// Retry policy for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Pooled HTTP client plus retry policy
#[derive(Clone)]
pub struct FeedHttp {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl FeedHttp {
    /// Client that verifies TLS certificates
    pub fn new(pool_size: usize, retry: RetryPolicy) -> Result<Self, FeedError> {
        Self::build(pool_size, retry, true)
    }

    /// Client that accepts self-signed certificates (on-premise MISP)
    pub fn insecure(pool_size: usize, retry: RetryPolicy) -> Result<Self, FeedError> {
        Self::build(pool_size, retry, false)
    }

    fn build(pool_size: usize, retry: RetryPolicy, verify_tls: bool) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(pool_size.max(1))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        Ok(Self { client, retry })
    }

    /// Send a request built by `build`, retrying transient failures
    ///
    /// Returns the response only for 2xx statuses.
    pub async fn send<F>(&self, source: Source, build: F) -> Result<Response, FeedError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            let outcome = build(&self.client).send().await;

            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(e) => !e.is_builder(),
            };

            if !retryable || attempt >= self.retry.max_retries {
                return match outcome {
                    Ok(response) if response.status().is_success() => {
                        debug!(source = %source, status = %response.status(), attempt, "Feed responded");
                        Ok(response)
                    }
                    Ok(response) => Err(FeedError::Status(response.status().as_u16())),
                    Err(e) if e.is_timeout() => Err(FeedError::Timeout),
                    Err(e) => Err(FeedError::Transport(e.to_string())),
                };
            }

            attempt += 1;
            warn!(
                source = %source,
                attempt,
                max_retries = self.retry.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                "Transient feed failure, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Read the body and decode it against an explicit schema
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, FeedError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| FeedError::Transport(e.to_string()))?;
    parse_json(&body)
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, FeedError> {
    serde_json::from_slice(body).map_err(|e| FeedError::Decode(e.to_string()))
}

/// Substitute `{address}` in an endpoint template
pub fn render_endpoint(template: &str, address: &str) -> String {
    template.replace("{address}", address)
}
