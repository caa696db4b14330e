use serde::Serialize;

use crate::http::{CacheMode, FetchRequest};
use crate::resource::{Resource, ResourceType};

/// What the fetcher does with an existing resource for a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevalidationPolicy {
    /// Hand out the existing resource as is.
    Use,
    /// Keep the existing resource and validate it with a conditional request.
    Revalidate,
    /// Drop the existing resource and load a fresh one.
    Reload,
    /// Nothing to reuse; create and load.
    Load,
}

impl RevalidationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RevalidationPolicy::Use => "use",
            RevalidationPolicy::Revalidate => "revalidate",
            RevalidationPolicy::Reload => "reload",
            RevalidationPolicy::Load => "load",
        }
    }
}

impl std::fmt::Display for RevalidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-side facts the policy depends on.
pub(crate) struct PolicyInput<'a> {
    pub request: &'a FetchRequest,
    pub resource_type: ResourceType,
    pub is_static_data: bool,
    pub context_cache_mode: CacheMode,
    pub is_load_complete: bool,
    /// The URL was already handed out by this fetcher during the current
    /// page load.
    pub url_validated: bool,
}

impl PolicyInput<'_> {
    fn cache_mode(&self) -> CacheMode {
        match self.request.resource_request().cache_mode() {
            CacheMode::Default => self.context_cache_mode,
            mode => mode,
        }
    }
}

/// Decide how to serve `input.request` given what is already cached.
/// Returns the policy and a short reason for logging.
pub(crate) fn determine(
    existing: Option<&Resource>,
    input: &PolicyInput<'_>,
) -> (RevalidationPolicy, &'static str) {
    use RevalidationPolicy::*;

    let Some(existing) = existing else {
        return (Load, "no existing resource");
    };
    let request = input.request;
    let resource_request = request.resource_request();

    if existing.must_refetch_due_to_integrity_metadata(request) {
        return (Reload, "integrity metadata differs");
    }
    if existing.resource_type() != input.resource_type {
        return (Reload, "resource type differs");
    }
    if input.is_static_data {
        return (Use, "static data");
    }
    if !existing.can_reuse(request) {
        return (Reload, "request cannot reuse resource");
    }
    if resource_request.is_conditional() {
        return (Reload, "conditional request");
    }
    if !existing.options().can_reuse_request(request.options()) {
        return (Reload, "loader options differ");
    }
    if existing.is_preloaded() {
        return (Use, "preloaded");
    }

    let cache_mode = input.cache_mode();
    if cache_mode == CacheMode::ReturnCacheDataElseLoad {
        return (Use, "cache mode returns cached data");
    }
    if resource_request.cache_control_contains_no_store() {
        return (Reload, "request forbids storing");
    }
    if existing.resource_request().allow_stored_credentials()
        != resource_request.allow_stored_credentials()
    {
        return (Reload, "credentials mode differs");
    }
    if existing.is_loaded() && existing.must_reload_due_to_vary_header(resource_request) {
        return (Reload, "vary header mismatch");
    }

    // Raw fetches are never grouped.
    if input.resource_type != ResourceType::Raw {
        // During the initial page load every request for a URL gets the
        // same resource.
        if !input.is_load_complete && input.url_validated {
            return (Use, "already validated during load");
        }
        if existing.is_loading() {
            return (Use, "already loading");
        }
    }

    if cache_mode == CacheMode::BypassCache {
        return (Reload, "cache mode bypasses cache");
    }
    if existing.error_occurred() {
        return (Reload, "previous load failed");
    }
    if !existing.can_reuse_redirect_chain() {
        return (Reload, "redirect chain not reusable");
    }

    if cache_mode == CacheMode::ValidateCache
        || existing.must_revalidate_due_to_cache_headers()
        || resource_request.cache_control_contains_no_cache()
    {
        if existing.is_cache_validator() {
            return (Use, "already revalidating");
        }
        if existing.can_use_cache_validator() {
            return (Revalidate, "stale with validators");
        }
        return (Reload, "stale without validators");
    }

    (Use, "fresh")
}
