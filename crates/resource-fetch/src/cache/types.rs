//! # Cache Types
//!
//! Keys, configuration and statistics for the memory cache.

use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::http::url_without_fragment;

/// Identity of a cached resource: the URL without its fragment plus the
/// cache partition it was requested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub url: String,
    pub identifier: String,
}

impl CacheKey {
    pub fn new(url: &Url, identifier: &str) -> Self {
        Self {
            url: url_without_fragment(url),
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.identifier.is_empty() {
            f.write_str(&self.url)
        } else {
            write!(f, "{} [{}]", self.url, self.identifier)
        }
    }
}

/// How hard a prune pass tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneStrategy {
    /// Bring the cache just under capacity, sparing recently decoded live
    /// resources.
    Automatic,
    /// Memory pressure: release everything that can be released.
    Maximal,
}

/// Memory cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Advisory capacity in bytes. Live resources may exceed it.
    pub capacity: usize,
    /// Live resources decoded more recently than this are skipped by an
    /// automatic prune.
    pub delay_before_live_decoded_prune: Duration,
    /// Prunes requested sooner than this after the previous one are deferred
    /// to a scheduled task.
    pub max_prune_deferral_delay: Duration,
    /// Keep a strong handle to cached resources so they outlive their last
    /// external owner until pruned.
    pub retain_unobserved: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 8 * 1024 * 1024, // 8MB
            delay_before_live_decoded_prune: Duration::from_secs(1),
            max_prune_deferral_delay: Duration::from_millis(500),
            retain_unobserved: true,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> crate::builder::CacheConfigBuilder {
        crate::builder::CacheConfigBuilder::new()
    }
}

/// Snapshot of memory cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub live_entries: usize,
    pub dead_entries: usize,
    pub capacity: usize,
    pub live_size: usize,
    pub dead_size: usize,
    pub encoded_size: usize,
    pub decoded_size: usize,
    pub prune_count: u64,
}

impl CacheStats {
    pub fn total_size(&self) -> usize {
        self.live_size + self.dead_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strips_fragment() {
        let a = CacheKey::new(&Url::parse("https://example.com/a.css#one").unwrap(), "");
        let b = CacheKey::new(&Url::parse("https://example.com/a.css#two").unwrap(), "");
        let c = CacheKey::new(&Url::parse("https://example.com/a.css").unwrap(), "frame-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "https://example.com/a.css");
        assert_eq!(c.to_string(), "https://example.com/a.css [frame-2]");
    }
}
