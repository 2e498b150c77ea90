//! Core data models for market resolution
//!
//! Everything here is scoped to a single resolution run: descriptors are
//! looked up from the registry, observations are collected from the fan-out,
//! and the consensus result is derived once and never mutated. Nothing in
//! this module is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Question category, selecting both the candidate sources and the
/// consensus mode that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Price,
    Weather,
    Social,
    News,
    OnChain,
    General,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Price,
        Category::Weather,
        Category::Social,
        Category::News,
        Category::OnChain,
        Category::General,
    ];

    /// Consensus mode for this category: price questions reduce to a single
    /// scalar, everything else is a boolean agreement count.
    pub fn consensus_mode(&self) -> ConsensusMode {
        match self {
            Category::Price => ConsensusMode::Numeric,
            _ => ConsensusMode::Agreement,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Price => "price",
            Category::Weather => "weather",
            Category::Social => "social",
            Category::News => "news",
            Category::OnChain => "onchain",
            Category::General => "general",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "price" => Ok(Category::Price),
            "weather" => Ok(Category::Weather),
            "social" => Ok(Category::Social),
            "news" => Ok(Category::News),
            "onchain" => Ok(Category::OnChain),
            "general" => Ok(Category::General),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// How observations are combined into a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusMode {
    /// Median plus spread over numeric observations.
    Numeric,
    /// Majority vote over boolean claims.
    Agreement,
}

/// Transport used to query a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    Rest,
    GraphQl,
    Scrape,
    Rpc,
}

/// How the answer is pulled out of a source response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionRule {
    /// Fixed JSON path into a structured response, e.g. `$.bitcoin.usd`.
    JsonPath(String),
    /// CSS selector into an HTML response.
    Selector(String),
    /// No fixed path; the raw content needs interpretive extraction.
    Interpretive,
}

/// One candidate source for a category. Owned by the registry and looked
/// up per resolution, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    pub category: Category,
    pub kind: FetchKind,
    pub rule: ExtractionRule,
    /// A priori reliability score, 0-100.
    pub reliability: u8,
}

/// The typed answer a single source produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObservedValue {
    Numeric(f64),
    Claim(bool),
    Text(String),
}

impl fmt::Display for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedValue::Numeric(v) => write!(f, "{:.2}", v),
            ObservedValue::Claim(true) => write!(f, "yes"),
            ObservedValue::Claim(false) => write!(f, "no"),
            ObservedValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Result of one source query, success or failure. One slot per dispatched
/// fetch; a failed source still counts against agreement confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub value: Option<ObservedValue>,
    pub observed_at: DateTime<Utc>,
    pub failure: Option<String>,
}

impl Observation {
    pub fn ok(source: impl Into<String>, value: ObservedValue) -> Self {
        Self {
            source: source.into(),
            value: Some(value),
            observed_at: Utc::now(),
            failure: None,
        }
    }

    pub fn failed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            value: None,
            observed_at: Utc::now(),
            failure: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.value.is_some()
    }
}

/// Aggregated verdict over one fan-out. Immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub outcome: bool,
    /// 0-100.
    pub confidence: u8,
    /// Names of the sources that contributed a successful observation,
    /// in dispatch order.
    pub sources: Vec<String>,
    /// One human-readable line per successful observation.
    pub evidence: Vec<String>,
    /// Median of the numeric observations (numeric mode only).
    pub median: Option<f64>,
    /// Percentage spread (max-min)/median (numeric mode only).
    pub spread_pct: Option<f64>,
}

/// A market pending resolution. Owned by the oracle contract collaborator;
/// read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: u64,
    pub question: String,
    pub deadline: DateTime<Utc>,
    pub resolved: bool,
}

/// The gate's decision for one consensus result.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected { confidence: u8, threshold: u8 },
    InsufficientData { succeeded: usize, required: usize },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Rejected {
                confidence,
                threshold,
            } => write!(f, "rejected ({}% < {}%)", confidence, threshold),
            Verdict::InsufficientData {
                succeeded,
                required,
            } => write!(f, "insufficient data ({} of {} required)", succeeded, required),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in Category::ALL {
            let parsed: Category = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("galactic".parse::<Category>().is_err());
    }

    #[test]
    fn test_consensus_mode_selection() {
        assert_eq!(Category::Price.consensus_mode(), ConsensusMode::Numeric);
        assert_eq!(Category::Weather.consensus_mode(), ConsensusMode::Agreement);
        assert_eq!(Category::General.consensus_mode(), ConsensusMode::Agreement);
    }

    #[test]
    fn test_observation_success() {
        let ok = Observation::ok("binance", ObservedValue::Numeric(60000.0));
        assert!(ok.succeeded());

        let failed = Observation::failed("kraken", "timeout after 10s");
        assert!(!failed.succeeded());
        assert_eq!(failed.failure.as_deref(), Some("timeout after 10s"));
    }

    #[test]
    fn test_category_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Category::OnChain).unwrap(),
            "\"onchain\""
        );
        assert_eq!(
            serde_json::from_str::<Category>("\"price\"").unwrap(),
            Category::Price
        );
    }

    #[test]
    fn test_observed_value_display() {
        assert_eq!(ObservedValue::Numeric(60005.5).to_string(), "60005.50");
        assert_eq!(ObservedValue::Claim(true).to_string(), "yes");
        assert_eq!(ObservedValue::Claim(false).to_string(), "no");
    }
}
