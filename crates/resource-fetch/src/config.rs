use std::time::Duration;

use crate::cache::CacheConfig;
use crate::http::ResourceLoadPriority;

/// Configurable options for a resource fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Memory cache settings used when the fetcher owns its cache
    pub cache_config: CacheConfig,

    /// Memory cache partition used when the context does not name one
    pub cache_identifier: String,

    /// Redirect hops accepted before a load fails
    pub max_redirects: usize,

    /// Time a font may load before observers may fall back
    pub font_short_limit: Duration,

    /// Time a font may load before observers give up on it
    pub font_long_limit: Duration,

    /// Priority given to requests built with `ResourceFetcher::new_request`
    pub default_priority: ResourceLoadPriority,

    /// Maximum number of URLs remembered as validated during a page load
    pub validated_url_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_config: CacheConfig::default(),
            cache_identifier: String::new(),
            max_redirects: 20,
            font_short_limit: Duration::from_millis(100),
            font_long_limit: Duration::from_secs(3),
            default_priority: ResourceLoadPriority::Medium,
            validated_url_limit: 10_000,
        }
    }
}

impl FetcherConfig {
    pub fn builder() -> crate::builder::FetcherConfigBuilder {
        crate::builder::FetcherConfigBuilder::new()
    }
}
