//! Configuration for the resolution oracle
//!
//! Layered the usual way: built-in defaults, then `config/default` and
//! `config/local` files if present, then `ALETHEIA`-prefixed environment
//! variables (double underscore separates nested keys, e.g.
//! `ALETHEIA__ORACLE__API_URL`).
//!
//! Validation runs once at startup; a bad configuration is fatal, never
//! recovered mid-run.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use aletheia_core::{
    Category, ExtractionRule, SourceDescriptor, DEFAULT_ACCEPTANCE_THRESHOLD,
    MIN_SUCCESSFUL_SOURCES, TARGET_SOURCES,
};

use crate::error::{OracleError, Result};
use crate::registry::parse_kind;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub oracle: OracleApiConfig,
    pub extractor: ExtractorConfig,
    pub resolution: ResolutionConfig,
    pub cache: CacheConfig,
    /// Optional per-category source overrides; a listed category replaces
    /// its built-in table entirely.
    #[serde(default)]
    pub sources: HashMap<String, Vec<SourceOverride>>,
}

/// Where pending markets are read from and resolutions are written to.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleApiConfig {
    pub api_url: String,
    pub timeout_seconds: u64,
}

/// The text-understanding collaborator used for interpretive extraction
/// and dynamic source discovery.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    pub api_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolutionConfig {
    /// Minimum confidence (0-100) for a resolution to be accepted.
    pub acceptance_threshold: u8,
    /// Successful observations required before any consensus is produced.
    pub min_successful_sources: usize,
    /// Fan-out size per market.
    pub target_sources: usize,
    /// Per-fetch timeout.
    pub fetch_timeout_seconds: u64,
    /// Ceiling for one market's whole resolution; past it, in-flight
    /// fetches are abandoned and the market stays pending.
    pub market_deadline_seconds: u64,
    /// "static" (registry lookup) or "dynamic" (collaborator-backed).
    pub discovery: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub ttl_seconds: u64,
}

/// One source entry in a configured override list.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceOverride {
    pub name: String,
    pub url: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// JSON path into the response; omitted means the source needs
    /// interpretive extraction.
    #[serde(default)]
    pub extraction_path: Option<String>,
    #[serde(default = "default_reliability")]
    pub reliability: u8,
}

fn default_kind() -> String {
    "rest".to_string()
}

fn default_reliability() -> u8 {
    90
}

/// Discovery strategy selection, parsed from the `resolution.discovery`
/// string during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    Static,
    Dynamic,
}

impl AppConfig {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("oracle.api_url", "http://localhost:3000")?
            .set_default("oracle.timeout_seconds", 30)?
            .set_default("extractor.api_url", "http://localhost:11434")?
            .set_default("extractor.model", "llama3.2:latest")?
            .set_default("extractor.timeout_seconds", 30)?
            .set_default(
                "resolution.acceptance_threshold",
                DEFAULT_ACCEPTANCE_THRESHOLD as i64,
            )?
            .set_default(
                "resolution.min_successful_sources",
                MIN_SUCCESSFUL_SOURCES as i64,
            )?
            .set_default("resolution.target_sources", TARGET_SOURCES as i64)?
            .set_default("resolution.fetch_timeout_seconds", 10)?
            .set_default("resolution.market_deadline_seconds", 120)?
            .set_default("resolution.discovery", "static")?
            .set_default("cache.max_capacity", 100)?
            .set_default("cache.ttl_seconds", 300)?
            // Load from config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ALETHEIA__ORACLE__API_URL, etc.)
            .add_source(
                Environment::with_prefix("ALETHEIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Startup validation. Any violation here is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.resolution.acceptance_threshold > 100 {
            return Err(OracleError::Config(format!(
                "acceptance_threshold must be 0-100, got {}",
                self.resolution.acceptance_threshold
            )));
        }
        if self.resolution.target_sources == 0 {
            return Err(OracleError::Config(
                "target_sources must be at least 1".to_string(),
            ));
        }
        if self.resolution.min_successful_sources == 0 {
            return Err(OracleError::Config(
                "min_successful_sources must be at least 1".to_string(),
            ));
        }
        if self.resolution.min_successful_sources > self.resolution.target_sources {
            return Err(OracleError::Config(format!(
                "min_successful_sources ({}) exceeds target_sources ({})",
                self.resolution.min_successful_sources, self.resolution.target_sources
            )));
        }
        if self.resolution.fetch_timeout_seconds == 0 {
            return Err(OracleError::Config(
                "fetch_timeout_seconds must be at least 1".to_string(),
            ));
        }
        self.discovery_mode()?;

        for (category, sources) in &self.sources {
            Category::from_str(category).map_err(OracleError::Config)?;
            if sources.is_empty() {
                return Err(OracleError::Config(format!(
                    "source override for '{}' is empty",
                    category
                )));
            }
            for source in sources {
                source.validate(category)?;
            }
        }

        Ok(())
    }

    pub fn discovery_mode(&self) -> Result<DiscoveryMode> {
        match self.resolution.discovery.as_str() {
            "static" => Ok(DiscoveryMode::Static),
            "dynamic" => Ok(DiscoveryMode::Dynamic),
            other => Err(OracleError::Config(format!(
                "unknown discovery mode '{}', expected 'static' or 'dynamic'",
                other
            ))),
        }
    }

    /// Override lists converted to registry descriptors, keyed by parsed
    /// category. Call after `validate()`.
    pub fn source_overrides(&self) -> Result<HashMap<Category, Vec<SourceDescriptor>>> {
        let mut overrides = HashMap::new();
        for (name, sources) in &self.sources {
            let category = Category::from_str(name).map_err(OracleError::Config)?;
            let descriptors = sources
                .iter()
                .map(|s| s.to_descriptor(category))
                .collect::<Result<Vec<_>>>()?;
            overrides.insert(category, descriptors);
        }
        Ok(overrides)
    }
}

impl SourceOverride {
    fn validate(&self, category: &str) -> Result<()> {
        if self.name.is_empty() || self.url.is_empty() {
            return Err(OracleError::Config(format!(
                "source override in '{}' is missing a name or url",
                category
            )));
        }
        if self.reliability > 100 {
            return Err(OracleError::Config(format!(
                "source '{}' reliability must be 0-100, got {}",
                self.name, self.reliability
            )));
        }
        parse_kind(&self.kind).ok_or_else(|| {
            OracleError::Config(format!(
                "source '{}' has unknown fetch kind '{}'",
                self.name, self.kind
            ))
        })?;
        Ok(())
    }

    fn to_descriptor(&self, category: Category) -> Result<SourceDescriptor> {
        let kind = parse_kind(&self.kind).ok_or_else(|| {
            OracleError::Config(format!("unknown fetch kind '{}'", self.kind))
        })?;
        let rule = match &self.extraction_path {
            Some(path) => ExtractionRule::JsonPath(path.clone()),
            None => ExtractionRule::Interpretive,
        };
        Ok(SourceDescriptor {
            name: self.name.clone(),
            url: self.url.clone(),
            category,
            kind,
            rule,
            reliability: self.reliability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aletheia_core::FetchKind;

    fn base_config() -> AppConfig {
        AppConfig {
            oracle: OracleApiConfig {
                api_url: "http://localhost:3000".into(),
                timeout_seconds: 30,
            },
            extractor: ExtractorConfig {
                api_url: "http://localhost:11434".into(),
                model: "llama3.2:latest".into(),
                timeout_seconds: 30,
            },
            resolution: ResolutionConfig {
                acceptance_threshold: 80,
                min_successful_sources: 3,
                target_sources: 5,
                fetch_timeout_seconds: 10,
                market_deadline_seconds: 120,
                discovery: "static".into(),
            },
            cache: CacheConfig {
                max_capacity: 100,
                ttl_seconds: 300,
            },
            sources: HashMap::new(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_threshold_over_100_is_fatal() {
        let mut config = base_config();
        config.resolution.acceptance_threshold = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_exceeding_target_is_fatal() {
        let mut config = base_config();
        config.resolution.min_successful_sources = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_discovery_mode_is_fatal() {
        let mut config = base_config();
        config.resolution.discovery = "oracular".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_override_category_is_fatal() {
        let mut config = base_config();
        config.sources.insert(
            "astrology".into(),
            vec![SourceOverride {
                name: "stars".into(),
                url: "https://example.com".into(),
                kind: "rest".into(),
                extraction_path: None,
                reliability: 90,
            }],
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_override_converts_to_descriptors() {
        let mut config = base_config();
        config.sources.insert(
            "price".into(),
            vec![SourceOverride {
                name: "MyExchange".into(),
                url: "https://api.myexchange.test/price".into(),
                kind: "rest".into(),
                extraction_path: Some("$.price".into()),
                reliability: 92,
            }],
        );
        config.validate().unwrap();

        let overrides = config.source_overrides().unwrap();
        let price = &overrides[&Category::Price];
        assert_eq!(price.len(), 1);
        assert_eq!(price[0].name, "MyExchange");
        assert_eq!(price[0].rule, ExtractionRule::JsonPath("$.price".into()));
        assert_eq!(price[0].kind, FetchKind::Rest);
    }

    #[test]
    fn test_override_without_path_is_interpretive() {
        let over = SourceOverride {
            name: "NewsDesk".into(),
            url: "https://news.test/feed".into(),
            kind: "rest".into(),
            extraction_path: None,
            reliability: 88,
        };
        let descriptor = over.to_descriptor(Category::News).unwrap();
        assert_eq!(descriptor.rule, ExtractionRule::Interpretive);
    }
}
