//! Catalog engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Bounds for one read-through cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Maximum number of entries held; least-recently-used eviction on
    /// overflow. Zero disables caching.
    pub capacity: usize,
    /// Entry time-to-live in seconds; expired entries are re-fetched.
    pub ttl_seconds: u64,
}

impl CachePolicy {
    /// Creates a policy with the given bounds.
    #[must_use]
    pub const fn new(capacity: usize, ttl_seconds: u64) -> Self {
        Self {
            capacity,
            ttl_seconds,
        }
    }

    /// The time-to-live as a [`Duration`].
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(100, 60)
    }
}

/// Configuration for the catalog resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Cache bounds for metadata-type lookups.
    pub metadata_type_cache: CachePolicy,
    /// Cache bounds for product lookups.
    pub product_cache: CachePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = CatalogConfig::default();
        assert_eq!(config.metadata_type_cache, CachePolicy::new(100, 60));
        assert_eq!(config.product_cache.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{"product_cache": {"capacity": 10}}"#).expect("deserialize");
        assert_eq!(config.product_cache.capacity, 10);
        assert_eq!(config.product_cache.ttl_seconds, 60);
        assert_eq!(config.metadata_type_cache, CachePolicy::default());
    }
}
