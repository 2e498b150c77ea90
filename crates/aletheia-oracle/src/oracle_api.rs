//! Oracle contract gateway
//!
//! The chain collaborator behind a narrow read/write interface: list the
//! markets whose deadline has passed unresolved, and submit an accepted
//! resolution with a digest of its evidence. The engine never submits for
//! a market it has not itself routed through the acceptance gate, and a
//! duplicate submission is the collaborator's problem to reject.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use aletheia_core::{ConsensusResult, Market};

use crate::config::OracleApiConfig;
use crate::error::{OracleError, Result};

/// Read side: markets pending resolution.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn list_pending_markets(&self) -> Result<Vec<Market>>;
}

/// Write side: accepted resolutions.
#[async_trait]
pub trait ResolutionSink: Send + Sync {
    async fn submit_resolution(
        &self,
        market_id: u64,
        outcome: bool,
        confidence: u8,
        evidence_digest: [u8; 32],
    ) -> Result<()>;
}

pub struct OracleApiClient {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct PendingMarketsResponse {
    markets: Vec<MarketDto>,
}

#[derive(Debug, Deserialize)]
struct MarketDto {
    id: u64,
    question: String,
    deadline: DateTime<Utc>,
    #[serde(default)]
    resolved: bool,
}

#[derive(Debug, Serialize)]
struct SubmitResolutionRequest<'a> {
    outcome: bool,
    confidence: u8,
    evidence_digest: &'a str,
}

impl OracleApiClient {
    pub fn new(config: &OracleApiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.api_url.clone(),
        }
    }
}

#[async_trait]
impl MarketSource for OracleApiClient {
    async fn list_pending_markets(&self) -> Result<Vec<Market>> {
        let url = format!("{}/api/v1/markets/pending", self.api_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::MarketSource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::MarketSource(format!(
                "market list returned status {}",
                response.status()
            )));
        }

        let data: PendingMarketsResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MarketSource(e.to_string()))?;

        Ok(data
            .markets
            .into_iter()
            .map(|m| Market {
                id: m.id,
                question: m.question,
                deadline: m.deadline,
                resolved: m.resolved,
            })
            .collect())
    }
}

#[async_trait]
impl ResolutionSink for OracleApiClient {
    async fn submit_resolution(
        &self,
        market_id: u64,
        outcome: bool,
        confidence: u8,
        evidence_digest: [u8; 32],
    ) -> Result<()> {
        let url = format!("{}/api/v1/markets/{}/resolution", self.api_url, market_id);
        let digest_hex = hex_encode(&evidence_digest);
        let request = SubmitResolutionRequest {
            outcome,
            confidence,
            evidence_digest: &digest_hex,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::ResolutionSink(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::ResolutionSink(format!(
                "resolution submit returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// SHA-256 over the canonical proof JSON: outcome, confidence, the
/// contributing source names, and the evidence lines, in that order.
pub fn evidence_digest(result: &ConsensusResult) -> [u8; 32] {
    let proof = serde_json::json!({
        "outcome": result.outcome,
        "confidence": result.confidence,
        "sources": result.sources,
        "evidence": result.evidence,
    });

    let mut hasher = Sha256::new();
    hasher.update(proof.to_string().as_bytes());
    hasher.finalize().into()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
