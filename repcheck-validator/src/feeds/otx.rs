//! AlienVault OTX client
//!
//! Scores an address by the number of OTX pulses that reference it.

use super::http::{decode_json, render_endpoint, FeedHttp};
use super::{FeedError, ReputationFeed};
use async_trait::async_trait;
use repcheck_common::config::OtxConfig;
use repcheck_common::{Source, SourceScore};
use serde::Deserialize;
use std::time::Duration;

/// `GET /api/v1/indicators/IPv4/{ip}/general` (fields we read)
#[derive(Debug, Deserialize)]
struct OtxGeneralResponse {
    pulse_info: OtxPulseInfo,
}

#[derive(Debug, Deserialize)]
struct OtxPulseInfo {
    count: u64,
}

/// More than `strong_threshold` pulses is a strong finding, any pulse a weak one
pub fn score_pulse_count(count: u64, strong_threshold: u64) -> SourceScore {
    if count > strong_threshold {
        SourceScore::STRONG
    } else if count > 0 {
        SourceScore::WEAK
    } else {
        SourceScore::NONE
    }
}

pub struct OtxFeed {
    http: FeedHttp,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    strong_threshold: u64,
}

impl OtxFeed {
    pub fn new(config: &OtxConfig, http: FeedHttp) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            strong_threshold: config.strong_threshold,
        }
    }
}

#[async_trait]
impl ReputationFeed for OtxFeed {
    fn source(&self) -> Source {
        Source::Otx
    }

    async fn fetch_score(&self, address: &str) -> Result<SourceScore, FeedError> {
        let url = render_endpoint(&self.endpoint, address);

        let response = self
            .http
            .send(Source::Otx, |client| {
                client
                    .get(&url)
                    .header("X-OTX-API-KEY", &self.api_key)
                    .timeout(self.timeout)
            })
            .await?;

        let body: OtxGeneralResponse = decode_json(response).await?;
        Ok(score_pulse_count(body.pulse_info.count, self.strong_threshold))
    }
}
