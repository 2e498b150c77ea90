//! Source fetchers
//!
//! One fetch call per source per resolution. The contract is the whole
//! point: a fetcher never lets an error escape - timeouts, non-2xx
//! statuses, malformed bodies, and extraction misses all come back as
//! failed [`Observation`]s so one bad source cannot abort the fan-out.
//! Fetches share nothing mutable; each call produces its own observation.
//!
//! Three variants, routed by descriptor:
//! - price: GET + fixed JSON path to a number
//! - generic REST: GET + structured extraction, falling back to
//!   interpretive extraction when the path misses
//! - interpretive: raw content plus the question handed to the
//!   text-understanding collaborator

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use aletheia_core::{
    ConsensusMode, ExtractionRule, ObservedValue, Observation, SourceDescriptor,
};

use crate::extractor::ExtractorClient;

/// Executes one source query. Implementations must capture every failure
/// in the returned observation instead of propagating it.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        question: &str,
        timeout: Duration,
    ) -> Observation;
}

/// Routes each descriptor to the matching variant and bounds the whole
/// fetch with the per-source timeout.
pub struct FetcherRouter {
    price: PriceFetcher,
    rest: RestFetcher,
    interpretive: InterpretiveFetcher,
}

#[derive(Debug, PartialEq)]
enum Variant {
    Price,
    Rest,
    Interpretive,
}

fn variant_for(source: &SourceDescriptor) -> Variant {
    match &source.rule {
        // Selector rules would need an HTML engine; the collaborator
        // reads the raw page instead.
        ExtractionRule::Interpretive | ExtractionRule::Selector(_) => Variant::Interpretive,
        ExtractionRule::JsonPath(_) => match source.category.consensus_mode() {
            ConsensusMode::Numeric => Variant::Price,
            ConsensusMode::Agreement => Variant::Rest,
        },
    }
}

impl FetcherRouter {
    pub fn new(client: Client, extractor: Arc<ExtractorClient>) -> Self {
        Self {
            price: PriceFetcher {
                client: client.clone(),
            },
            rest: RestFetcher {
                client: client.clone(),
                extractor: Arc::clone(&extractor),
            },
            interpretive: InterpretiveFetcher { client, extractor },
        }
    }
}

#[async_trait]
impl SourceFetcher for FetcherRouter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        question: &str,
        timeout: Duration,
    ) -> Observation {
        let inner = async {
            match variant_for(source) {
                Variant::Price => self.price.fetch(source, question, timeout).await,
                Variant::Rest => self.rest.fetch(source, question, timeout).await,
                Variant::Interpretive => {
                    self.interpretive.fetch(source, question, timeout).await
                }
            }
        };

        match tokio::time::timeout(timeout, inner).await {
            Ok(observation) => observation,
            Err(_) => {
                Observation::failed(&source.name, format!("timeout after {}s", timeout.as_secs()))
            }
        }
    }
}

/// Numeric price endpoint: fixed JSON path to a float.
pub struct PriceFetcher {
    client: Client,
}

#[async_trait]
impl SourceFetcher for PriceFetcher {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        _question: &str,
        _timeout: Duration,
    ) -> Observation {
        let path = match &source.rule {
            ExtractionRule::JsonPath(path) => path,
            _ => {
                return Observation::failed(&source.name, "price source has no extraction path")
            }
        };

        let body = match get_json(&self.client, &source.url).await {
            Ok(body) => body,
            Err(reason) => return Observation::failed(&source.name, reason),
        };

        match walk_path(&body, path).and_then(numeric_value) {
            Some(price) => {
                debug!(source = %source.name, price, "Price fetched");
                Observation::ok(&source.name, ObservedValue::Numeric(price))
            }
            None => Observation::failed(
                &source.name,
                format!("no numeric value at {} in response", path),
            ),
        }
    }
}

/// Generic REST endpoint: structured extraction first, interpretive
/// fallback when the body or the path does not cooperate.
pub struct RestFetcher {
    client: Client,
    extractor: Arc<ExtractorClient>,
}

#[async_trait]
impl SourceFetcher for RestFetcher {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        question: &str,
        _timeout: Duration,
    ) -> Observation {
        let raw = match get_text(&self.client, &source.url).await {
            Ok(raw) => raw,
            Err(reason) => return Observation::failed(&source.name, reason),
        };

        if let ExtractionRule::JsonPath(path) = &source.rule {
            if let Ok(body) = serde_json::from_str::<Value>(&raw) {
                if let Some(target) = walk_path(&body, path) {
                    match classify_scalar(target) {
                        Some(ObservedValue::Text(text)) => {
                            // A bare string answers nothing by itself;
                            // let the collaborator read it.
                            return interpret(&self.extractor, source, question, &text).await;
                        }
                        Some(value) => return Observation::ok(&source.name, value),
                        None => {
                            // Arrays and objects carry the answer somewhere
                            // inside; hand the fragment over.
                            let fragment = target.to_string();
                            return interpret(&self.extractor, source, question, &fragment).await;
                        }
                    }
                }
            }
        }

        interpret(&self.extractor, source, question, &raw).await
    }
}

/// No fixed extraction: fetch the content and ask the collaborator.
pub struct InterpretiveFetcher {
    client: Client,
    extractor: Arc<ExtractorClient>,
}

#[async_trait]
impl SourceFetcher for InterpretiveFetcher {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        question: &str,
        _timeout: Duration,
    ) -> Observation {
        let content = match get_text(&self.client, &source.url).await {
            Ok(content) => content,
            Err(reason) => return Observation::failed(&source.name, reason),
        };

        interpret(&self.extractor, source, question, &content).await
    }
}

/// Shared interpretive tail: a null or low-confidence answer is a failed
/// observation, never a fabricated claim.
async fn interpret(
    extractor: &ExtractorClient,
    source: &SourceDescriptor,
    question: &str,
    content: &str,
) -> Observation {
    match extractor.extract(question, content).await {
        Ok(extraction) if extraction.is_usable() => {
            if let Some(answer) = extraction.answer {
                Observation::ok(&source.name, ObservedValue::Claim(answer))
            } else if let Some(value) = extraction.value {
                Observation::ok(&source.name, ObservedValue::Numeric(value))
            } else {
                Observation::failed(&source.name, "extractor returned an empty answer")
            }
        }
        Ok(extraction) => Observation::failed(
            &source.name,
            format!(
                "extractor answer unusable (confidence {})",
                extraction.confidence
            ),
        ),
        Err(e) => Observation::failed(&source.name, e.to_string()),
    }
}

async fn get_text(client: &Client, url: &str) -> Result<String, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }

    response.text().await.map_err(|e| e.to_string())
}

async fn get_json(client: &Client, url: &str) -> Result<Value, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }

    response.json().await.map_err(|e| e.to_string())
}

/// Walk a registry-style JSON path: `$.a.b`, `$[0].x`, `$.a[2].b`.
pub fn walk_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let rest = path.strip_prefix('$')?;
    let mut current = root;
    let mut chars = rest.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                if key.is_empty() {
                    return None;
                }
                current = current.get(key.as_str())?;
            }
            '[' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&next) = chars.peek() {
                    if next == ']' {
                        break;
                    }
                    digits.push(next);
                    chars.next();
                }
                // Consume the closing bracket.
                chars.next()?;
                let index: usize = digits.parse().ok()?;
                current = current.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Scalar JSON to a typed observation value. Numbers (including
/// string-wrapped numbers, which the exchange APIs are fond of) become
/// Numeric, yes/no-ish strings become Claims, other strings stay Text.
/// Arrays and objects return None.
fn classify_scalar(value: &Value) -> Option<ObservedValue> {
    match value {
        Value::Bool(b) => Some(ObservedValue::Claim(*b)),
        Value::Number(n) => n.as_f64().map(ObservedValue::Numeric),
        Value::String(s) => {
            if let Ok(number) = s.trim().parse::<f64>() {
                return Some(ObservedValue::Numeric(number));
            }
            match s.trim().to_lowercase().as_str() {
                "yes" | "true" | "confirmed" => Some(ObservedValue::Claim(true)),
                "no" | "false" | "denied" => Some(ObservedValue::Claim(false)),
                _ => Some(ObservedValue::Text(s.clone())),
            }
        }
        _ => None,
    }
}
