//! MISP client
//!
//! Searches the MISP attribute store for the address. Any matching attribute
//! is a strong finding; MISP has no weak tier.

use super::http::{decode_json, FeedHttp};
use super::{FeedError, ReputationFeed};
use async_trait::async_trait;
use repcheck_common::config::MispConfig;
use repcheck_common::{Source, SourceScore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RestSearchRequest<'a> {
    value: &'a str,
}

/// `POST /attributes/restSearch` response (fields we read)
///
/// A missing `response` or `Attribute` member means nothing matched.
#[derive(Debug, Deserialize)]
struct RestSearchResponse {
    #[serde(default)]
    response: Option<AttributeList>,
}

#[derive(Debug, Deserialize)]
struct AttributeList {
    #[serde(default, rename = "Attribute")]
    attribute: Option<Vec<serde_json::Value>>,
}

impl RestSearchResponse {
    fn attribute_count(&self) -> usize {
        self.response
            .as_ref()
            .and_then(|r| r.attribute.as_ref())
            .map_or(0, Vec::len)
    }
}

pub fn score_attribute_count(count: usize) -> SourceScore {
    if count > 0 {
        SourceScore::STRONG
    } else {
        SourceScore::NONE
    }
}

pub struct MispFeed {
    http: FeedHttp,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl MispFeed {
    pub fn new(config: &MispConfig, http: FeedHttp) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ReputationFeed for MispFeed {
    fn source(&self) -> Source {
        Source::Misp
    }

    async fn fetch_score(&self, address: &str) -> Result<SourceScore, FeedError> {
        let request = RestSearchRequest { value: address };

        let response = self
            .http
            .send(Source::Misp, |client| {
                client
                    .post(&self.endpoint)
                    .header("Authorization", &self.api_key)
                    .header("Accept", "application/json")
                    .json(&request)
                    .timeout(self.timeout)
            })
            .await?;

        let body: RestSearchResponse = decode_json(response).await?;
        Ok(score_attribute_count(body.attribute_count()))
    }
}
