//! Discovery result cache
//!
//! Dynamic discovery costs a collaborator round-trip per question, but
//! source lists barely change between scheduler cycles. Cache them per
//! category with a TTL so back-to-back cycles reuse the same fan-out.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use aletheia_core::{Category, SourceDescriptor};

use crate::config::CacheConfig;

#[derive(Clone)]
pub struct DiscoveryCache {
    cache: Cache<Category, Vec<SourceDescriptor>>,
}

impl DiscoveryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self { cache }
    }

    pub async fn get(&self, category: Category) -> Option<Vec<SourceDescriptor>> {
        self.cache.get(&category).await
    }

    pub async fn set(&self, category: Category, sources: Vec<SourceDescriptor>) {
        self.cache.insert(category, sources).await;
    }
}

pub type SharedCache = Arc<DiscoveryCache>;

pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(DiscoveryCache::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aletheia_core::{ExtractionRule, FetchKind};

    fn descriptor(name: &str) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            url: format!("https://{}.test", name),
            category: Category::Price,
            kind: FetchKind::Rest,
            rule: ExtractionRule::Interpretive,
            reliability: 90,
        }
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let cache = DiscoveryCache::new(&CacheConfig {
            max_capacity: 10,
            ttl_seconds: 60,
        });

        assert!(cache.get(Category::Price).await.is_none());

        cache
            .set(Category::Price, vec![descriptor("a"), descriptor("b")])
            .await;

        let cached = cache.get(Category::Price).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert!(cache.get(Category::News).await.is_none());
    }
}
