//! # Cache System
//!
//! In-memory cache of resources shared by the fetchers of a loading
//! context. Completed resources are kept for reuse; capacity is enforced by
//! pruning decoded data and releasing unobserved resources.

mod memory;
mod types;

pub use memory::{MemoryCache, WeakMemoryCache};
pub use types::{CacheConfig, CacheKey, CacheStats, PruneStrategy};
