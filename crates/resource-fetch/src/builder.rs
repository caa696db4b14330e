//! # Configuration Builders
//!
//! Fluent builders for [`CacheConfig`] and [`FetcherConfig`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use resource_fetch::{CacheConfig, FetcherConfig};
//!
//! let config = FetcherConfig::builder()
//!     .with_cache_config(
//!         CacheConfig::builder()
//!             .with_capacity(16 * 1024 * 1024)
//!             .with_max_prune_deferral_delay(Duration::from_millis(250))
//!             .build(),
//!     )
//!     .with_cache_identifier("frame-1")
//!     .with_font_limits(Duration::from_millis(200), Duration::from_secs(5))
//!     .build();
//! assert_eq!(config.cache_config.capacity, 16 * 1024 * 1024);
//! ```

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::config::FetcherConfig;
use crate::http::ResourceLoadPriority;

/// Builder for creating CacheConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }

    /// Set the advisory capacity in bytes
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn with_delay_before_live_decoded_prune(mut self, delay: Duration) -> Self {
        self.config.delay_before_live_decoded_prune = delay;
        self
    }

    pub fn with_max_prune_deferral_delay(mut self, delay: Duration) -> Self {
        self.config.max_prune_deferral_delay = delay;
        self
    }

    /// Keep unobserved resources alive until a prune releases them
    pub fn with_retain_unobserved(mut self, retain: bool) -> Self {
        self.config.retain_unobserved = retain;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating FetcherConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct FetcherConfigBuilder {
    config: FetcherConfig,
}

impl FetcherConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FetcherConfig::default(),
        }
    }

    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.config.cache_config = cache_config;
        self
    }

    /// Set the memory cache partition
    pub fn with_cache_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.config.cache_identifier = identifier.into();
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Set the short and long font load limits
    pub fn with_font_limits(mut self, short_limit: Duration, long_limit: Duration) -> Self {
        self.config.font_short_limit = short_limit;
        self.config.font_long_limit = long_limit.max(short_limit);
        self
    }

    pub fn with_default_priority(mut self, priority: ResourceLoadPriority) -> Self {
        self.config.default_priority = priority;
        self
    }

    pub fn with_validated_url_limit(mut self, limit: usize) -> Self {
        self.config.validated_url_limit = limit;
        self
    }

    pub fn build(self) -> FetcherConfig {
        self.config
    }
}

impl Default for FetcherConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cache = CacheConfigBuilder::new().build();
        assert_eq!(cache.capacity, 8 * 1024 * 1024);
        assert_eq!(cache.delay_before_live_decoded_prune, Duration::from_secs(1));
        assert_eq!(cache.max_prune_deferral_delay, Duration::from_millis(500));
        assert!(cache.retain_unobserved);

        let fetcher = FetcherConfigBuilder::new().build();
        assert_eq!(fetcher.max_redirects, 20);
        assert_eq!(fetcher.font_short_limit, Duration::from_millis(100));
        assert_eq!(fetcher.font_long_limit, Duration::from_secs(3));
        assert_eq!(fetcher.default_priority, ResourceLoadPriority::Medium);
        assert!(fetcher.cache_identifier.is_empty());
    }

    #[test]
    fn test_builder_customization() {
        let config = FetcherConfig::builder()
            .with_cache_config(
                CacheConfig::builder()
                    .with_capacity(1024)
                    .with_retain_unobserved(false)
                    .build(),
            )
            .with_cache_identifier("partition-a")
            .with_max_redirects(5)
            .with_default_priority(ResourceLoadPriority::High)
            .with_validated_url_limit(16)
            .build();

        assert_eq!(config.cache_config.capacity, 1024);
        assert!(!config.cache_config.retain_unobserved);
        assert_eq!(config.cache_identifier, "partition-a");
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.default_priority, ResourceLoadPriority::High);
        assert_eq!(config.validated_url_limit, 16);
    }

    #[test]
    fn test_long_font_limit_never_below_short() {
        let config = FetcherConfigBuilder::new()
            .with_font_limits(Duration::from_secs(2), Duration::from_secs(1))
            .build();
        assert_eq!(config.font_long_limit, Duration::from_secs(2));
    }
}
