//! Kaspersky OpenTIP client
//!
//! Scores an address by the reputation zone OpenTIP assigns it.

use super::http::{decode_json, render_endpoint, FeedHttp};
use super::{FeedError, ReputationFeed};
use async_trait::async_trait;
use repcheck_common::config::KasperskyConfig;
use repcheck_common::{Source, SourceScore};
use serde::Deserialize;
use std::time::Duration;

/// `GET /api/v1/search/ip?request={ip}` (fields we read)
#[derive(Debug, Deserialize)]
struct IpSearchResponse {
    #[serde(default, rename = "Zone")]
    zone: Option<String>,
}

/// Red → strong, Orange → weak, anything else (Green, Grey, missing) → none
///
/// Zone names are matched exactly as OpenTIP spells them.
pub fn score_zone(zone: Option<&str>) -> SourceScore {
    match zone {
        Some("Red") => SourceScore::STRONG,
        Some("Orange") => SourceScore::WEAK,
        _ => SourceScore::NONE,
    }
}

pub struct KasperskyFeed {
    http: FeedHttp,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl KasperskyFeed {
    pub fn new(config: &KasperskyConfig, http: FeedHttp) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ReputationFeed for KasperskyFeed {
    fn source(&self) -> Source {
        Source::Kaspersky
    }

    async fn fetch_score(&self, address: &str) -> Result<SourceScore, FeedError> {
        let url = render_endpoint(&self.endpoint, address);

        let response = self
            .http
            .send(Source::Kaspersky, |client| {
                client
                    .get(&url)
                    .header("x-api-key", &self.api_key)
                    .timeout(self.timeout)
            })
            .await?;

        let body: IpSearchResponse = decode_json(response).await?;
        Ok(score_zone(body.zone.as_deref()))
    }
}
