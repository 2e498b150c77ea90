//! Text-understanding collaborator client
//!
//! Interpretive extraction hands raw source content plus the market
//! question to an external model service and expects a structured answer
//! back. The same collaborator proposes source lists for dynamic
//! discovery. All failures surface as [`OracleError::Extraction`]; the
//! fetch layer converts them into failed observations so one bad
//! extraction can never abort a batch.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use aletheia_core::Category;

use crate::config::ExtractorConfig;
use crate::error::{OracleError, Result};

/// Answers below this confidence are treated as failed observations.
pub const MIN_EXTRACTION_CONFIDENCE: u8 = 50;

pub struct ExtractorClient {
    client: Client,
    api_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    model: &'a str,
    question: &'a str,
    content: &'a str,
}

/// Structured answer from the collaborator: a boolean claim, a scalar
/// value, or neither (which the caller treats as a failure).
#[derive(Debug, Clone, Deserialize)]
pub struct Extraction {
    pub answer: Option<bool>,
    pub value: Option<f64>,
    #[serde(default)]
    pub confidence: u8,
}

impl Extraction {
    /// An extraction is usable when it carries an answer or a value at
    /// workable confidence.
    pub fn is_usable(&self) -> bool {
        (self.answer.is_some() || self.value.is_some())
            && self.confidence >= MIN_EXTRACTION_CONFIDENCE
    }
}

#[derive(Debug, Serialize)]
struct ProposeSourcesRequest<'a> {
    model: &'a str,
    question: &'a str,
    category: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProposeSourcesResponse {
    #[serde(default)]
    sources: Vec<ProposedSource>,
}

/// A source descriptor as proposed by the collaborator, before
/// sanitization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_type: Option<String>,
    #[serde(default)]
    pub extraction_path: Option<String>,
    #[serde(default)]
    pub reliability: Option<u8>,
}

impl ExtractorClient {
    pub fn new(config: &ExtractorConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
        }
    }

    /// Ask the collaborator to answer `question` from `content`.
    pub async fn extract(&self, question: &str, content: &str) -> Result<Extraction> {
        let url = format!("{}/v1/extract", self.api_url);
        let request = ExtractRequest {
            model: &self.model,
            question,
            content,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Http(format!(
                "extractor returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::Extraction(e.to_string()))
    }

    /// Ask the collaborator to propose candidate sources for a question.
    /// Used by dynamic discovery; the registry sanitizes and backfills
    /// whatever comes back.
    pub async fn propose_sources(
        &self,
        question: &str,
        category: Category,
    ) -> Result<Vec<ProposedSource>> {
        let url = format!("{}/v1/sources", self.api_url);
        let category_name = category.to_string();
        let request = ProposeSourcesRequest {
            model: &self.model,
            question,
            category: &category_name,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Http(format!(
                "source discovery returned status {}",
                response.status()
            )));
        }

        let data: ProposeSourcesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Extraction(e.to_string()))?;

        Ok(data.sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_extraction() {
        let answer = Extraction {
            answer: Some(true),
            value: None,
            confidence: 90,
        };
        assert!(answer.is_usable());

        let value = Extraction {
            answer: None,
            value: Some(60123.0),
            confidence: 75,
        };
        assert!(value.is_usable());
    }

    #[test]
    fn test_null_answer_is_unusable() {
        let neither = Extraction {
            answer: None,
            value: None,
            confidence: 99,
        };
        assert!(!neither.is_usable());
    }

    #[test]
    fn test_low_confidence_is_unusable() {
        let hesitant = Extraction {
            answer: Some(false),
            value: None,
            confidence: 49,
        };
        assert!(!hesitant.is_usable());
    }

    #[test]
    fn test_proposed_source_defaults() {
        let raw = serde_json::json!({ "name": "SomeAPI" });
        let proposed: ProposedSource = serde_json::from_value(raw).unwrap();
        assert_eq!(proposed.name, "SomeAPI");
        assert!(proposed.url.is_empty());
        assert!(proposed.reliability.is_none());
    }
}
