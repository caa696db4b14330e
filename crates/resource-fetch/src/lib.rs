//! # Resource Fetch
//!
//! A resource loading and memory caching engine for page rendering
//! pipelines. A [`ResourceFetcher`] serves typed subresource requests
//! (style sheets, scripts, images, fonts, raw fetches) from a shared
//! [`MemoryCache`], deciding per request whether a cached resource can be
//! used as is, must be revalidated, or has to be loaded again.
//!
//! ## Features
//!
//! - HTTP freshness and revalidation (`Cache-Control`, `Expires`, `ETag`,
//!   `Last-Modified`, `Vary`)
//! - One in-flight load per URL during a page load, with observer fan-out
//! - Preload tracking and claim accounting
//! - Memory-bounded cache with deferred LRU pruning of dead resources
//! - Typed decoded payloads that can be dropped and rebuilt on demand
//! - `data:` URLs, subresource integrity and MIME type checks
//! - A reqwest-backed transport plus a pluggable [`Transport`] trait
//!
//! The engine is single-threaded: resources, the cache and the fetcher use
//! `Rc` and are driven from one thread (or one `LocalSet`).

pub mod builder;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod freshness;
pub mod http;
pub mod resource;
pub mod scheduler;
pub mod test_utils;
pub mod transport;
pub mod variants;

pub use builder::{CacheConfigBuilder, FetcherConfigBuilder};
pub use cache::{CacheConfig, CacheStats, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FetcherConfig;
pub use error::{FetchError, RefusalReason, ResourceError, TransportError};

// Re-export the fetcher surface
pub use fetcher::{
    ClearPreloadsPolicy, DefaultFetchContext, FetchContext, FetchStats, PreloadStats,
    ResourceFetcher, RevalidationPolicy,
};

// Re-export request and response types
pub use http::{CacheMode, FetchRequest, ResourceLoadPriority, ResourceRequest, ResourceResponse};

pub use resource::{Resource, ResourceClient, ResourceStatus, ResourceType};
pub use scheduler::Scheduler;

// Re-export transports
pub use transport::{
    LoaderEvent, LoaderSink, ReqwestTransport, Transport, TransportConfig, TransportConfigBuilder,
    TransportHandle,
};

// Re-export typed variants
pub use variants::{
    FontResource, ImageResource, RawResource, RawResourceFactory, ResourceFactory, ScriptResource,
    StyleSheetResource,
};
