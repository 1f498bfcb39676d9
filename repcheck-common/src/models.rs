//! Validation data model
//!
//! Types shared between the validation pipeline, the persistence layer and
//! the HTTP API. Field names on the wire follow the alert payloads produced
//! by the upstream SIEM extraction (`source_ip`, `destination_ip`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Address type tag carried on every result
pub const ADDRESS_KIND_IP: &str = "ip";

/// Status string rendered for every source of an errored entry
pub const STATUS_ERROR: &str = "error";

/// Threat-intelligence feed identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Otx,
    Misp,
    Kaspersky,
}

impl Source {
    /// All sources, in result column order
    pub const ALL: [Source; 3] = [Source::Otx, Source::Misp, Source::Kaspersky];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Otx => "otx",
            Source::Misp => "misp",
            Source::Kaspersky => "kaspersky",
        }
    }

    /// Cache key for this source and address (`otx_ip:1.2.3.4`)
    pub fn cache_key(&self, address: &str) -> String {
        format!("{}_ip:{}", self.as_str(), address)
    }

    /// Glob matching every cached key of this source
    pub fn cache_pattern(&self) -> String {
        format!("{}_ip:*", self.as_str())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feed reputation score: 0 (no finding), 1 (weak), 2 (strong)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct SourceScore(u8);

impl SourceScore {
    pub const NONE: SourceScore = SourceScore(0);
    pub const WEAK: SourceScore = SourceScore(1);
    pub const STRONG: SourceScore = SourceScore(2);

    /// Returns `None` for values outside {0,1,2}
    pub fn new(value: u8) -> Option<Self> {
        (value <= 2).then_some(SourceScore(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Human-readable status for result rendering
    pub fn status(&self) -> &'static str {
        match self.0 {
            2 => "malicious",
            1 => "suspicious",
            _ => "clean",
        }
    }
}

impl FromStr for SourceScore {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("not a score: {:?}", s)))?;
        SourceScore::new(value)
            .ok_or_else(|| Error::InvalidInput(format!("score out of range: {}", value)))
    }
}

/// One score per feed for a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreTriple {
    pub otx: SourceScore,
    pub misp: SourceScore,
    pub kaspersky: SourceScore,
}

impl ScoreTriple {
    pub fn new(otx: SourceScore, misp: SourceScore, kaspersky: SourceScore) -> Self {
        Self { otx, misp, kaspersky }
    }

    pub fn get(&self, source: Source) -> SourceScore {
        match source {
            Source::Otx => self.otx,
            Source::Misp => self.misp,
            Source::Kaspersky => self.kaspersky,
        }
    }

    /// Sum of the three scores (0-6)
    pub fn total(&self) -> u8 {
        self.otx.value() + self.misp.value() + self.kaspersky.value()
    }
}

/// Fused verdict for an address
///
/// `Benign`, `Borderline` and `Dangerous` are the three tiers derived from
/// the score total. `Error` only marks entries that could not be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    Benign,
    Borderline,
    Dangerous,
    Error,
}

impl Conclusion {
    /// 0 → benign, 1 → borderline, anything higher → dangerous
    pub fn from_total(total: u8) -> Self {
        match total {
            0 => Conclusion::Benign,
            1 => Conclusion::Borderline,
            _ => Conclusion::Dangerous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Benign => "benign",
            Conclusion::Borderline => "borderline",
            Conclusion::Dangerous => "dangerous",
            Conclusion::Error => "error",
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Conclusion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "benign" => Ok(Conclusion::Benign),
            "borderline" => Ok(Conclusion::Borderline),
            "dangerous" => Ok(Conclusion::Dangerous),
            "error" => Ok(Conclusion::Error),
            other => Err(Error::InvalidInput(format!("unknown conclusion: {}", other))),
        }
    }
}

/// Per-source status strings, keyed by source name on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceStatuses {
    pub otx: String,
    pub misp: String,
    pub kaspersky: String,
}

impl SourceStatuses {
    pub fn from_scores(scores: &ScoreTriple) -> Self {
        Self {
            otx: scores.otx.status().to_string(),
            misp: scores.misp.status().to_string(),
            kaspersky: scores.kaspersky.status().to_string(),
        }
    }

    pub fn errored() -> Self {
        Self {
            otx: STATUS_ERROR.to_string(),
            misp: STATUS_ERROR.to_string(),
            kaspersky: STATUS_ERROR.to_string(),
        }
    }
}

/// One address to validate, plus the alert metadata it arrived with
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationEntry {
    #[serde(alias = "source_ip")]
    pub address: String,
    #[serde(default, alias = "destination_ip")]
    pub peer_address: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ValidationEntry {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Reject entries whose required address is blank
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::InvalidInput(
                "field 'address' (or 'source_ip') is required on every entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of validating one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub results: SourceStatuses,
    pub total_malicious: u8,
    pub conclusion: Conclusion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
    pub rule: Option<String>,
    pub severity: Option<String>,
    pub country: Option<String>,
    pub module: Option<String>,
    pub timestamp: Option<String>,
}

impl ValidationResult {
    /// Result for a scored entry; `total` and `conclusion` come from fusion
    pub fn scored(
        entry: &ValidationEntry,
        scores: &ScoreTriple,
        total: u8,
        conclusion: Conclusion,
    ) -> Self {
        Self::with_entry(entry, SourceStatuses::from_scores(scores), total, conclusion, None)
    }

    /// Explicit error result: zero score, error marker on every source
    pub fn errored(entry: &ValidationEntry, message: impl Into<String>) -> Self {
        Self::with_entry(
            entry,
            SourceStatuses::errored(),
            0,
            Conclusion::Error,
            Some(message.into()),
        )
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn with_entry(
        entry: &ValidationEntry,
        results: SourceStatuses,
        total_malicious: u8,
        conclusion: Conclusion,
        error: Option<String>,
    ) -> Self {
        Self {
            kind: ADDRESS_KIND_IP.to_string(),
            value: entry.address.clone(),
            results,
            total_malicious,
            conclusion,
            error,
            source_ip: Some(entry.address.clone()),
            destination_ip: entry.peer_address.clone(),
            rule: entry.rule.clone(),
            severity: entry.severity.clone(),
            country: entry.country.clone(),
            module: entry.module.clone(),
            timestamp: entry.timestamp.clone(),
        }
    }
}

/// A persisted validation result
///
/// Field order is fixed; its JSON serialization is the canonical form used
/// for duplicate detection on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub source_ip: Option<String>,
    pub destination_ip: Option<String>,
    pub country: Option<String>,
    pub rule: Option<String>,
    pub severity: Option<String>,
    pub module: Option<String>,
    pub timestamp: Option<String>,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub results: SourceStatuses,
    pub total_malicious: i64,
    pub conclusion: String,
}

impl From<&ValidationResult> for HistoryRecord {
    fn from(result: &ValidationResult) -> Self {
        Self {
            source_ip: result.source_ip.clone(),
            destination_ip: result.destination_ip.clone(),
            country: result.country.clone(),
            rule: result.rule.clone(),
            severity: result.severity.clone(),
            module: result.module.clone(),
            timestamp: result.timestamp.clone(),
            value: result.value.clone(),
            kind: result.kind.clone(),
            results: result.results.clone(),
            total_malicious: i64::from(result.total_malicious),
            conclusion: result.conclusion.as_str().to_string(),
        }
    }
}
