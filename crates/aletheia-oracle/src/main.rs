//! Aletheia Resolution Oracle
//!
//! Resolves free-form prediction-market questions into accepted or
//! rejected outcomes by multi-source consensus: each pending market is
//! categorized, fanned out to five independent data sources, aggregated
//! by median/spread or agreement count, and written back only when the
//! confidence gate passes.
//!
//! One process run is one resolution cycle. An external scheduler owns
//! the cadence; rejected and data-starved markets simply stay pending
//! until the next invocation.

mod cache;
mod config;
mod error;
mod extractor;
mod fetch;
mod oracle_api;
mod pipeline;
mod registry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::create_cache;
use crate::config::{AppConfig, DiscoveryMode};
use crate::extractor::ExtractorClient;
use crate::fetch::FetcherRouter;
use crate::oracle_api::{MarketSource, OracleApiClient, ResolutionSink};
use crate::pipeline::ResolutionPipeline;
use crate::registry::{DynamicDiscovery, SourceDiscovery, SourceRegistry, StaticDiscovery};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aletheia=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Aletheia resolution oracle v0.2.0");

    // A bad configuration is fatal at startup, never recovered mid-run.
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        oracle_api = %config.oracle.api_url,
        discovery = %config.resolution.discovery,
        acceptance_threshold = config.resolution.acceptance_threshold,
        target_sources = config.resolution.target_sources,
        "Configuration loaded"
    );

    let registry = Arc::new(SourceRegistry::with_overrides(config.source_overrides()?));
    let extractor = Arc::new(ExtractorClient::new(&config.extractor));
    let oracle = Arc::new(OracleApiClient::new(&config.oracle));

    let discovery: Arc<dyn SourceDiscovery> = match config.discovery_mode()? {
        DiscoveryMode::Static => Arc::new(StaticDiscovery::new(
            Arc::clone(&registry),
            config.resolution.target_sources,
        )),
        DiscoveryMode::Dynamic => Arc::new(DynamicDiscovery::new(
            Arc::clone(&registry),
            Arc::clone(&extractor),
            create_cache(&config.cache),
            config.resolution.target_sources,
        )),
    };

    let http = Client::builder()
        .timeout(Duration::from_secs(config.resolution.fetch_timeout_seconds))
        .build()
        .expect("Failed to create HTTP client");
    let fetcher = Arc::new(FetcherRouter::new(http, Arc::clone(&extractor)));

    let markets: Arc<dyn MarketSource> = Arc::clone(&oracle) as Arc<dyn MarketSource>;
    let sink: Arc<dyn ResolutionSink> = oracle;

    let pipeline = ResolutionPipeline::new(markets, sink, discovery, fetcher, config.resolution);

    let summary = pipeline.run_cycle().await?;
    tracing::info!(
        resolved = summary.resolved.len(),
        pending = summary.pending.len(),
        "Resolution cycle complete"
    );
    for (market_id, reason) in &summary.pending {
        tracing::info!(market_id = *market_id, reason = %reason, "Left pending");
    }

    Ok(())
}
