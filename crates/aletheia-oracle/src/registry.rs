//! Source registry and discovery strategies
//!
//! The registry owns the per-category candidate tables; a discovery
//! strategy turns (question, category) into the ranked fan-out set.
//! `StaticDiscovery` is a table lookup with keyword relevance ranking;
//! `DynamicDiscovery` asks the text-understanding collaborator to propose
//! sources and falls back to the table when the proposal is unusable.
//! The strategy is selected by configuration, never hardcoded into the
//! aggregation path.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use aletheia_core::{Category, ExtractionRule, FetchKind, SourceDescriptor};

use crate::cache::SharedCache;
use crate::extractor::{ExtractorClient, ProposedSource};

/// Relevance boost per question keyword found in a source name.
const KEYWORD_BOOST: i32 = 10;

/// Reliability assumed for a proposed source that does not state one.
const DEFAULT_PROPOSED_RELIABILITY: u8 = 80;

pub struct SourceRegistry {
    tables: HashMap<Category, Vec<SourceDescriptor>>,
}

impl SourceRegistry {
    /// The built-in per-category tables.
    pub fn builtin() -> Self {
        let mut tables = HashMap::new();
        for category in Category::ALL {
            tables.insert(category, builtin_table(category));
        }
        Self { tables }
    }

    /// Built-in tables with configured categories replaced wholesale.
    pub fn with_overrides(overrides: HashMap<Category, Vec<SourceDescriptor>>) -> Self {
        let mut registry = Self::builtin();
        for (category, sources) in overrides {
            registry.tables.insert(category, sources);
        }
        registry
    }

    pub fn candidates(&self, category: Category) -> &[SourceDescriptor] {
        self.tables
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Candidates ranked by relevance to the question: reliability plus a
    /// boost for every question keyword appearing in the source name.
    pub fn ranked(&self, question: &str, category: Category, limit: usize) -> Vec<SourceDescriptor> {
        let keywords = question_keywords(question);
        let mut scored: Vec<(i32, &SourceDescriptor)> = self
            .candidates(category)
            .iter()
            .map(|s| (relevance_score(s, &keywords), s))
            .collect();
        // Stable sort keeps the table order for equal scores.
        scored.sort_by_key(|(score, _)| -score);
        scored
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect()
    }
}

fn question_keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(String::from)
        .collect()
}

fn relevance_score(source: &SourceDescriptor, keywords: &[String]) -> i32 {
    let name = source.name.to_lowercase();
    let boost = keywords.iter().filter(|kw| name.contains(kw.as_str())).count() as i32;
    source.reliability as i32 + boost * KEYWORD_BOOST
}

/// Strategy seam: how candidate sources are found for a question.
#[async_trait]
pub trait SourceDiscovery: Send + Sync {
    async fn discover(&self, question: &str, category: Category) -> Vec<SourceDescriptor>;
}

/// Table lookup plus relevance ranking.
pub struct StaticDiscovery {
    registry: Arc<SourceRegistry>,
    target: usize,
}

impl StaticDiscovery {
    pub fn new(registry: Arc<SourceRegistry>, target: usize) -> Self {
        Self { registry, target }
    }
}

#[async_trait]
impl SourceDiscovery for StaticDiscovery {
    async fn discover(&self, question: &str, category: Category) -> Vec<SourceDescriptor> {
        self.registry.ranked(question, category, self.target)
    }
}

/// Collaborator-backed discovery. Proposals are sanitized, backfilled from
/// the static table up to the target count, and cached per category.
pub struct DynamicDiscovery {
    registry: Arc<SourceRegistry>,
    extractor: Arc<ExtractorClient>,
    cache: SharedCache,
    target: usize,
}

impl DynamicDiscovery {
    pub fn new(
        registry: Arc<SourceRegistry>,
        extractor: Arc<ExtractorClient>,
        cache: SharedCache,
        target: usize,
    ) -> Self {
        Self {
            registry,
            extractor,
            cache,
            target,
        }
    }

    fn backfill(&self, mut sources: Vec<SourceDescriptor>, question: &str, category: Category) -> Vec<SourceDescriptor> {
        if sources.len() < self.target {
            for candidate in self.registry.ranked(question, category, self.target) {
                if sources.len() >= self.target {
                    break;
                }
                let duplicate = sources
                    .iter()
                    .any(|s| s.name.eq_ignore_ascii_case(&candidate.name));
                if !duplicate {
                    sources.push(candidate);
                }
            }
        }
        sources.truncate(self.target);
        sources
    }
}

#[async_trait]
impl SourceDiscovery for DynamicDiscovery {
    async fn discover(&self, question: &str, category: Category) -> Vec<SourceDescriptor> {
        if let Some(cached) = self.cache.get(category).await {
            debug!(%category, "Using cached discovery result");
            return cached;
        }

        let proposed = match self.extractor.propose_sources(question, category).await {
            Ok(proposed) => proposed,
            Err(e) => {
                warn!(%category, error = %e, "Source discovery failed, using static registry");
                return self.registry.ranked(question, category, self.target);
            }
        };

        let sanitized: Vec<SourceDescriptor> = proposed
            .into_iter()
            .filter_map(|p| sanitize_proposed(p, category))
            .collect();

        let sources = self.backfill(sanitized, question, category);
        self.cache.set(category, sources.clone()).await;
        sources
    }
}

/// Clamp and type a collaborator proposal; unusable entries are dropped.
fn sanitize_proposed(proposed: ProposedSource, category: Category) -> Option<SourceDescriptor> {
    if proposed.name.trim().is_empty() || proposed.url.trim().is_empty() {
        return None;
    }
    let kind = match proposed.api_type.as_deref() {
        None => FetchKind::Rest,
        Some(raw) => parse_kind(raw)?,
    };
    let rule = match proposed.extraction_path {
        Some(path) if !path.trim().is_empty() => ExtractionRule::JsonPath(path),
        _ => ExtractionRule::Interpretive,
    };
    Some(SourceDescriptor {
        name: proposed.name,
        url: proposed.url,
        category,
        kind,
        rule,
        reliability: proposed.reliability.unwrap_or(DEFAULT_PROPOSED_RELIABILITY).min(100),
    })
}

pub(crate) fn parse_kind(kind: &str) -> Option<FetchKind> {
    match kind.to_lowercase().as_str() {
        "rest" => Some(FetchKind::Rest),
        "graphql" => Some(FetchKind::GraphQl),
        "scrape" | "scraper" => Some(FetchKind::Scrape),
        "rpc" => Some(FetchKind::Rpc),
        _ => None,
    }
}

fn source(
    name: &str,
    url: &str,
    category: Category,
    kind: FetchKind,
    rule: ExtractionRule,
    reliability: u8,
) -> SourceDescriptor {
    SourceDescriptor {
        name: name.to_string(),
        url: url.to_string(),
        category,
        kind,
        rule,
        reliability,
    }
}

fn builtin_table(category: Category) -> Vec<SourceDescriptor> {
    use Category::*;
    use ExtractionRule::{Interpretive, JsonPath};
    use FetchKind::{Rest, Rpc, Scrape};

    match category {
        Price => vec![
            source(
                "CoinGecko",
                "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd",
                Price,
                Rest,
                JsonPath("$.bitcoin.usd".into()),
                95,
            ),
            source(
                "Binance",
                "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT",
                Price,
                Rest,
                JsonPath("$.price".into()),
                98,
            ),
            source(
                "Coinbase",
                "https://api.coinbase.com/v2/prices/BTC-USD/spot",
                Price,
                Rest,
                JsonPath("$.data.amount".into()),
                97,
            ),
            source(
                "Kraken",
                "https://api.kraken.com/0/public/Ticker?pair=XBTUSD",
                Price,
                Rest,
                JsonPath("$.result.XXBTZUSD.c[0]".into()),
                96,
            ),
            source(
                "CoinCap",
                "https://api.coincap.io/v2/assets/bitcoin",
                Price,
                Rest,
                JsonPath("$.data.priceUsd".into()),
                93,
            ),
            source(
                "CryptoCompare",
                "https://min-api.cryptocompare.com/data/price?fsym=BTC&tsyms=USD",
                Price,
                Rest,
                JsonPath("$.USD".into()),
                94,
            ),
        ],
        Weather => vec![
            source(
                "OpenWeatherMap",
                "https://api.openweathermap.org/data/2.5/weather",
                Weather,
                Rest,
                JsonPath("$.weather[0].main".into()),
                96,
            ),
            source(
                "WeatherAPI",
                "https://api.weatherapi.com/v1/current.json",
                Weather,
                Rest,
                JsonPath("$.current.condition.text".into()),
                95,
            ),
            source(
                "AccuWeather",
                "https://dataservice.accuweather.com/currentconditions/v1",
                Weather,
                Rest,
                JsonPath("$[0].WeatherText".into()),
                97,
            ),
            source(
                "NOAA",
                "https://api.weather.gov/gridpoints",
                Weather,
                Rest,
                JsonPath("$.properties.temperature.value".into()),
                98,
            ),
            source(
                "Tomorrow.io",
                "https://api.tomorrow.io/v4/timelines",
                Weather,
                Rest,
                JsonPath("$.data.timelines[0].intervals[0].values.temperature".into()),
                94,
            ),
        ],
        Social => vec![
            source(
                "Twitter API",
                "https://api.twitter.com/2/tweets/search/recent",
                Social,
                Rest,
                JsonPath("$.data".into()),
                90,
            ),
            source("Nitter", "https://nitter.net", Social, Scrape, Interpretive, 85),
            source(
                "Archive.org",
                "https://web.archive.org/cdx/search/cdx",
                Social,
                Rest,
                Interpretive,
                95,
            ),
            source(
                "NewsAPI",
                "https://newsapi.org/v2/everything",
                Social,
                Rest,
                JsonPath("$.articles".into()),
                92,
            ),
            source(
                "Google Search",
                "https://www.googleapis.com/customsearch/v1",
                Social,
                Rest,
                JsonPath("$.items".into()),
                88,
            ),
        ],
        News => vec![
            source(
                "Reuters",
                "https://www.reuters.com/arc/outboundfeeds",
                News,
                Rest,
                Interpretive,
                98,
            ),
            source(
                "Associated Press",
                "https://afs-prod.appspot.com/api/v2",
                News,
                Rest,
                Interpretive,
                99,
            ),
            source("BBC News", "https://www.bbc.com/news", News, Scrape, Interpretive, 97),
            source(
                "NewsAPI",
                "https://newsapi.org/v2/top-headlines",
                News,
                Rest,
                JsonPath("$.articles".into()),
                93,
            ),
            source(
                "Google News",
                "https://news.google.com/rss",
                News,
                Rest,
                Interpretive,
                90,
            ),
        ],
        OnChain => vec![
            source(
                "Etherscan",
                "https://api.etherscan.io/api",
                OnChain,
                Rest,
                JsonPath("$.result".into()),
                98,
            ),
            source("Infura", "https://mainnet.infura.io/v3", OnChain, Rpc, Interpretive, 97),
            source(
                "Alchemy",
                "https://eth-mainnet.g.alchemy.com/v2",
                OnChain,
                Rpc,
                Interpretive,
                98,
            ),
            source(
                "QuickNode",
                "https://endpoints.omniatech.io/v1/eth/mainnet",
                OnChain,
                Rpc,
                Interpretive,
                96,
            ),
            source(
                "Chainstack",
                "https://ethereum-mainnet.core.chainstack.com",
                OnChain,
                Rpc,
                Interpretive,
                95,
            ),
        ],
        General => vec![
            source(
                "Google Search",
                "https://www.googleapis.com/customsearch/v1",
                General,
                Rest,
                JsonPath("$.items".into()),
                92,
            ),
            source(
                "Bing Search",
                "https://api.bing.microsoft.com/v7.0/search",
                General,
                Rest,
                JsonPath("$.webPages.value".into()),
                90,
            ),
            source(
                "DuckDuckGo",
                "https://api.duckduckgo.com",
                General,
                Rest,
                JsonPath("$.RelatedTopics".into()),
                88,
            ),
            source(
                "Brave Search",
                "https://api.search.brave.com/res/v1/web/search",
                General,
                Rest,
                JsonPath("$.web.results".into()),
                89,
            ),
            source(
                "Wikipedia",
                "https://en.wikipedia.org/w/api.php",
                General,
                Rest,
                JsonPath("$.query.pages".into()),
                95,
            ),
        ],
    }
}
