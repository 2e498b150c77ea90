//! Per-cycle resolution pipeline
//!
//! One invocation resolves one batch of pending markets:
//!
//! categorize -> discover sources -> concurrent fan-out -> aggregate ->
//! gate -> submit
//!
//! Markets are independent: a failure in one is logged and that market
//! stays pending, the rest of the batch continues. Aggregation is a
//! barrier - it waits for every dispatched fetch to finish, success or
//! failure, because spread and agreement need the full observed set.
//! The external scheduler owns the cadence; nothing here loops or
//! retries.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use aletheia_core::{
    aggregate_agreement, aggregate_numeric, categorize, decide, parse_threshold, ConsensusError,
    ConsensusMode, Market, Observation, SourceDescriptor, Verdict, DEFAULT_PRICE_THRESHOLD,
};

use crate::config::ResolutionConfig;
use crate::error::Result;
use crate::fetch::SourceFetcher;
use crate::oracle_api::{evidence_digest, MarketSource, ResolutionSink};
use crate::registry::SourceDiscovery;

pub struct ResolutionPipeline {
    markets: Arc<dyn MarketSource>,
    sink: Arc<dyn ResolutionSink>,
    discovery: Arc<dyn SourceDiscovery>,
    fetcher: Arc<dyn SourceFetcher>,
    settings: ResolutionConfig,
}

/// What one cycle did, for the operator log.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub resolved: Vec<u64>,
    /// Markets left pending this cycle, with the reason each was skipped.
    pub pending: Vec<(u64, String)>,
}

enum MarketOutcome {
    Resolved,
    LeftPending(String),
}

impl ResolutionPipeline {
    pub fn new(
        markets: Arc<dyn MarketSource>,
        sink: Arc<dyn ResolutionSink>,
        discovery: Arc<dyn SourceDiscovery>,
        fetcher: Arc<dyn SourceFetcher>,
        settings: ResolutionConfig,
    ) -> Self {
        Self {
            markets,
            sink,
            discovery,
            fetcher,
            settings,
        }
    }

    /// Run one resolution cycle over all pending markets. A market-list
    /// read failure aborts the cycle; everything after that is isolated
    /// per market.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let markets = self.markets.list_pending_markets().await?;
        if markets.is_empty() {
            info!("No pending markets to resolve");
            return Ok(CycleSummary::default());
        }

        info!(count = markets.len(), "Processing pending markets");
        let deadline = Duration::from_secs(self.settings.market_deadline_seconds);
        let mut summary = CycleSummary::default();

        for market in &markets {
            match tokio::time::timeout(deadline, self.resolve_market(market)).await {
                Ok(Ok(MarketOutcome::Resolved)) => {
                    summary.resolved.push(market.id);
                }
                Ok(Ok(MarketOutcome::LeftPending(reason))) => {
                    summary.pending.push((market.id, reason));
                }
                Ok(Err(e)) => {
                    error!(
                        market_id = market.id,
                        error = %e,
                        "Market resolution failed, will retry next cycle"
                    );
                    summary.pending.push((market.id, e.to_string()));
                }
                Err(_) => {
                    warn!(
                        market_id = market.id,
                        deadline_seconds = self.settings.market_deadline_seconds,
                        "Resolution deadline exceeded, abandoning in-flight fetches"
                    );
                    summary
                        .pending
                        .push((market.id, "resolution deadline exceeded".to_string()));
                }
            }
        }

        Ok(summary)
    }

    async fn resolve_market(&self, market: &Market) -> Result<MarketOutcome> {
        let category = categorize(&market.question);
        info!(
            market_id = market.id,
            %category,
            question = %market.question,
            "Resolving market"
        );

        let sources = self.discovery.discover(&market.question, category).await;
        if sources.is_empty() {
            warn!(market_id = market.id, %category, "No candidate sources");
            return Ok(MarketOutcome::LeftPending("no candidate sources".to_string()));
        }

        let dispatched = sources.len();
        let observations = self.fetch_all(&sources, &market.question).await;

        for failed in observations.iter().filter(|o| !o.succeeded()) {
            warn!(
                market_id = market.id,
                source = %failed.source,
                reason = failed.failure.as_deref().unwrap_or("unknown"),
                "Source failed"
            );
        }

        let consensus = match category.consensus_mode() {
            ConsensusMode::Numeric => {
                let threshold = match parse_threshold(&market.question) {
                    Some(threshold) => threshold,
                    None => {
                        warn!(
                            market_id = market.id,
                            fallback = DEFAULT_PRICE_THRESHOLD,
                            "Question has no parseable threshold, using fallback"
                        );
                        DEFAULT_PRICE_THRESHOLD
                    }
                };
                aggregate_numeric(
                    &observations,
                    dispatched,
                    threshold,
                    self.settings.min_successful_sources,
                )
            }
            ConsensusMode::Agreement => aggregate_agreement(
                &observations,
                dispatched,
                self.settings.min_successful_sources,
            ),
        };

        let result = match consensus {
            Ok(result) => result,
            Err(e) => {
                let verdict = match &e {
                    ConsensusError::InsufficientData {
                        succeeded,
                        required,
                        ..
                    } => Verdict::InsufficientData {
                        succeeded: *succeeded,
                        required: *required,
                    },
                    ConsensusError::NoObservations => Verdict::InsufficientData {
                        succeeded: 0,
                        required: self.settings.min_successful_sources,
                    },
                };
                info!(market_id = market.id, %verdict, "Market stays pending");
                return Ok(MarketOutcome::LeftPending(verdict.to_string()));
            }
        };

        match decide(&result, self.settings.acceptance_threshold) {
            Verdict::Accepted => {
                let digest = evidence_digest(&result);
                self.sink
                    .submit_resolution(market.id, result.outcome, result.confidence, digest)
                    .await?;
                info!(
                    market_id = market.id,
                    outcome = result.outcome,
                    confidence = result.confidence,
                    sources = result.sources.len(),
                    "Resolution submitted"
                );
                Ok(MarketOutcome::Resolved)
            }
            verdict => {
                info!(
                    market_id = market.id,
                    confidence = result.confidence,
                    threshold = self.settings.acceptance_threshold,
                    %verdict,
                    "Market stays pending"
                );
                Ok(MarketOutcome::LeftPending(verdict.to_string()))
            }
        }
    }

    /// Fan one fetch task out per source, then wait for all of them.
    /// Each fetch owns its timeout; a panicked task is recorded as a
    /// failed observation like any other source failure.
    async fn fetch_all(&self, sources: &[SourceDescriptor], question: &str) -> Vec<Observation> {
        let timeout = Duration::from_secs(self.settings.fetch_timeout_seconds);

        let tasks: Vec<_> = sources
            .iter()
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                let source = source.clone();
                let question = question.to_string();
                tokio::spawn(async move { fetcher.fetch(&source, &question, timeout).await })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .zip(sources)
            .map(|(joined, source)| match joined {
                Ok(observation) => observation,
                Err(e) => Observation::failed(&source.name, format!("fetch task failed: {}", e)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use aletheia_core::{Category, ExtractionRule, FetchKind, ObservedValue};
    use crate::error::OracleError;

    fn settings() -> ResolutionConfig {
        ResolutionConfig {
            acceptance_threshold: 80,
            min_successful_sources: 3,
            target_sources: 5,
            fetch_timeout_seconds: 5,
            market_deadline_seconds: 30,
            discovery: "static".into(),
        }
    }

    fn market(id: u64, question: &str) -> Market {
        Market {
            id,
            question: question.to_string(),
            deadline: Utc::now(),
            resolved: false,
        }
    }

    fn descriptor(name: &str, category: Category) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            url: format!("https://{}.test", name),
            category,
            kind: FetchKind::Rest,
            rule: ExtractionRule::Interpretive,
            reliability: 90,
        }
    }

    struct FakeMarkets(Vec<Market>);

    #[async_trait]
    impl MarketSource for FakeMarkets {
        async fn list_pending_markets(&self) -> Result<Vec<Market>> {
            Ok(self.0.clone())
        }
    }

    struct FailingMarkets;

    #[async_trait]
    impl MarketSource for FailingMarkets {
        async fn list_pending_markets(&self) -> Result<Vec<Market>> {
            Err(OracleError::MarketSource("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        submissions: Mutex<Vec<(u64, bool, u8)>>,
        fail_for: Option<u64>,
    }

    #[async_trait]
    impl ResolutionSink for RecordingSink {
        async fn submit_resolution(
            &self,
            market_id: u64,
            outcome: bool,
            confidence: u8,
            _evidence_digest: [u8; 32],
        ) -> Result<()> {
            if self.fail_for == Some(market_id) {
                return Err(OracleError::ResolutionSink("already resolved".into()));
            }
            self.submissions
                .lock()
                .unwrap()
                .push((market_id, outcome, confidence));
            Ok(())
        }
    }

    struct FixedDiscovery(Vec<SourceDescriptor>);

    #[async_trait]
    impl SourceDiscovery for FixedDiscovery {
        async fn discover(&self, _question: &str, _category: Category) -> Vec<SourceDescriptor> {
            self.0.clone()
        }
    }

    enum Reply {
        Value(ObservedValue),
        Fail(&'static str),
    }

    struct ScriptedFetcher(HashMap<String, Reply>);

    #[async_trait]
    impl SourceFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            source: &SourceDescriptor,
            _question: &str,
            _timeout: Duration,
        ) -> Observation {
            match self.0.get(&source.name) {
                Some(Reply::Value(value)) => Observation::ok(&source.name, value.clone()),
                Some(Reply::Fail(reason)) => Observation::failed(&source.name, *reason),
                None => Observation::failed(&source.name, "unscripted source"),
            }
        }
    }

    struct SleepyFetcher;

    #[async_trait]
    impl SourceFetcher for SleepyFetcher {
        async fn fetch(
            &self,
            source: &SourceDescriptor,
            _question: &str,
            _timeout: Duration,
        ) -> Observation {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Observation::failed(&source.name, "unreachable")
        }
    }

    fn price_sources() -> Vec<SourceDescriptor> {
        ["coingecko", "binance", "coinbase", "kraken", "coincap"]
            .iter()
            .map(|name| descriptor(name, Category::Price))
            .collect()
    }

    fn pipeline(
        markets: Vec<Market>,
        sink: Arc<RecordingSink>,
        sources: Vec<SourceDescriptor>,
        replies: HashMap<String, Reply>,
        settings: ResolutionConfig,
    ) -> ResolutionPipeline {
        ResolutionPipeline::new(
            Arc::new(FakeMarkets(markets)),
            sink,
            Arc::new(FixedDiscovery(sources)),
            Arc::new(ScriptedFetcher(replies)),
            settings,
        )
    }

    fn numeric_replies(values: &[(&str, f64)]) -> HashMap<String, Reply> {
        values
            .iter()
            .map(|(name, v)| (name.to_string(), Reply::Value(ObservedValue::Numeric(*v))))
            .collect()
    }

    #[tokio::test]
    async fn test_price_market_resolves_true() {
        // Five tight quotes above the $60,000 threshold.
        let sink = Arc::new(RecordingSink::default());
        let replies = numeric_replies(&[
            ("coingecko", 60000.0),
            ("binance", 60050.0),
            ("coinbase", 59980.0),
            ("kraken", 60010.0),
            ("coincap", 60005.0),
        ]);
        let pipeline = pipeline(
            vec![market(1, "Will BTC close above $60,000 on March 1?")],
            Arc::clone(&sink),
            price_sources(),
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.resolved, vec![1]);
        assert!(summary.pending.is_empty());

        let submissions = sink.submissions.lock().unwrap();
        assert_eq!(submissions.as_slice(), &[(1, true, 95)]);
    }

    #[tokio::test]
    async fn test_price_market_resolves_false_with_one_failure() {
        // One source times out; the remaining four agree below the
        // threshold. A false outcome is still a valid resolution.
        let sink = Arc::new(RecordingSink::default());
        let mut replies = numeric_replies(&[
            ("coingecko", 59000.0),
            ("coinbase", 59050.0),
            ("kraken", 58990.0),
            ("coincap", 59010.0),
        ]);
        replies.insert("binance".into(), Reply::Fail("timeout after 5s"));
        let pipeline = pipeline(
            vec![market(2, "Will BTC close above $60,000 on March 1?")],
            Arc::clone(&sink),
            price_sources(),
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.resolved, vec![2]);

        let submissions = sink.submissions.lock().unwrap();
        assert_eq!(submissions.as_slice(), &[(2, false, 95)]);
    }

    #[tokio::test]
    async fn test_two_successes_is_insufficient() {
        let sink = Arc::new(RecordingSink::default());
        let mut replies = numeric_replies(&[("coingecko", 60000.0), ("binance", 60010.0)]);
        for name in ["coinbase", "kraken", "coincap"] {
            replies.insert(name.into(), Reply::Fail("status 503"));
        }
        let pipeline = pipeline(
            vec![market(3, "Will BTC close above $60,000 on March 1?")],
            Arc::clone(&sink),
            price_sources(),
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert!(summary.resolved.is_empty());
        assert_eq!(summary.pending.len(), 1);
        assert!(summary.pending[0].1.contains("insufficient data"));
        // No write is attempted for an unresolved market.
        assert!(sink.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agreement_below_threshold_is_rejected() {
        // Three sources agree true, two fail: 3/5 = 60% < 80%.
        let sink = Arc::new(RecordingSink::default());
        let sources: Vec<SourceDescriptor> = ["reuters", "ap", "bloomberg", "newsapi", "gnews"]
            .iter()
            .map(|name| descriptor(name, Category::News))
            .collect();
        let mut replies: HashMap<String, Reply> = ["reuters", "ap", "bloomberg"]
            .iter()
            .map(|name| (name.to_string(), Reply::Value(ObservedValue::Claim(true))))
            .collect();
        replies.insert("newsapi".into(), Reply::Fail("status 429"));
        replies.insert("gnews".into(), Reply::Fail("timeout after 5s"));
        let pipeline = pipeline(
            vec![market(4, "Will SpaceX announce the Starship date?")],
            Arc::clone(&sink),
            sources,
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert!(summary.resolved.is_empty());
        assert_eq!(summary.pending.len(), 1);
        assert!(summary.pending[0].1.contains("rejected"));
        assert!(sink.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_abort_batch() {
        let sink = Arc::new(RecordingSink {
            submissions: Mutex::new(Vec::new()),
            fail_for: Some(10),
        });
        let replies = numeric_replies(&[
            ("coingecko", 60100.0),
            ("binance", 60150.0),
            ("coinbase", 60080.0),
            ("kraken", 60110.0),
            ("coincap", 60105.0),
        ]);
        let pipeline = pipeline(
            vec![
                market(10, "Will BTC close above $60,000 on March 1?"),
                market(11, "Will BTC close above $60,000 on March 1?"),
            ],
            Arc::clone(&sink),
            price_sources(),
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        // Market 10's write failed; market 11 still went through.
        assert_eq!(summary.resolved, vec![11]);
        assert_eq!(summary.pending.len(), 1);
        assert_eq!(summary.pending[0].0, 10);

        let submissions = sink.submissions.lock().unwrap();
        assert_eq!(submissions.as_slice(), &[(11, true, 95)]);
    }

    #[tokio::test]
    async fn test_market_list_failure_is_reported() {
        let pipeline = ResolutionPipeline::new(
            Arc::new(FailingMarkets),
            Arc::new(RecordingSink::default()),
            Arc::new(FixedDiscovery(price_sources())),
            Arc::new(ScriptedFetcher(HashMap::new())),
            settings(),
        );
        assert!(pipeline.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn test_deadline_leaves_market_pending() {
        let sink = Arc::new(RecordingSink::default());
        let mut slow_settings = settings();
        slow_settings.market_deadline_seconds = 0;
        let pipeline = ResolutionPipeline::new(
            Arc::new(FakeMarkets(vec![market(
                5,
                "Will BTC close above $60,000 on March 1?",
            )])),
            sink.clone(),
            Arc::new(FixedDiscovery(price_sources())),
            Arc::new(SleepyFetcher),
            slow_settings,
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert!(summary.resolved.is_empty());
        assert_eq!(summary.pending.len(), 1);
        assert!(summary.pending[0].1.contains("deadline"));
        assert!(sink.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_discovery_leaves_market_pending() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = ResolutionPipeline::new(
            Arc::new(FakeMarkets(vec![market(6, "Will it rain in Tokyo?")])),
            sink.clone(),
            Arc::new(FixedDiscovery(Vec::new())),
            Arc::new(ScriptedFetcher(HashMap::new())),
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.pending.len(), 1);
        assert!(summary.pending[0].1.contains("no candidate sources"));
    }

    #[tokio::test]
    async fn test_threshold_fallback_applies() {
        // No number in the question: the default 60000 threshold decides.
        let sink = Arc::new(RecordingSink::default());
        let replies = numeric_replies(&[
            ("coingecko", 61000.0),
            ("binance", 61050.0),
            ("coinbase", 60980.0),
            ("kraken", 61010.0),
            ("coincap", 61005.0),
        ]);
        let pipeline = pipeline(
            vec![market(7, "Will the BTC rally continue?")],
            Arc::clone(&sink),
            price_sources(),
            replies,
            settings(),
        );

        let summary = pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.resolved, vec![7]);
        let submissions = sink.submissions.lock().unwrap();
        assert_eq!(submissions.as_slice(), &[(7, true, 95)]);
    }
}
