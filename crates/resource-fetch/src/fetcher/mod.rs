//! # Resource Fetcher
//!
//! Entry point for every load issued by a loading context. For each request
//! the fetcher looks for an existing resource in the memory cache and among
//! the resources it already handed out, decides whether to use, revalidate,
//! reload or load it ([`RevalidationPolicy`]), starts the transport when
//! needed and attaches the caller as an observer.
//!
//! Transport progress arrives as [`LoaderEvent`]s on a queue owned by the
//! fetcher. Nothing is applied to a resource until the owner drains the
//! queue with [`ResourceFetcher::run_until_idle`] or
//! [`ResourceFetcher::run_until_complete`], which also run the tasks posted
//! on the shared scheduler.
//!
//! ## Preloads
//!
//! Requests flagged as preloads are tracked separately. A later real request
//! that reuses a preloaded resource claims it: the preload is dropped from
//! the set, its loader starts blocking the load event and the claim is
//! counted in [`PreloadStats`].

use indexmap::IndexMap;
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::cache::MemoryCache;
use crate::clock::{Clock, elapsed_between};
use crate::config::FetcherConfig;
use crate::error::{FetchError, ResourceError};
use crate::http::{
    CacheMode, DataUrl, FetchRequest, ResourceLoadPriority, ResourceResponse, url_without_fragment,
};
use crate::resource::{
    PreloadReferencePolicy, PreloadResult, Resource, ResourceCallback, ResourceClient,
    ResourceEnv, ResourceType, WeakResource,
};
use crate::scheduler::Scheduler;
use crate::transport::{LoaderEvent, LoaderEventQueue, Transport, TransportHandle};
use crate::variants::{ResourceFactory, font};

mod context;
mod loader;
mod policy;
mod preload;
mod stats;

pub use context::{DefaultFetchContext, FetchContext};
pub(crate) use loader::LoaderRef;
pub use policy::RevalidationPolicy;
pub use preload::{ClearPreloadsPolicy, PreloadStats};
pub use stats::FetchStats;

use policy::PolicyInput;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique resource id.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

struct LoaderEntry {
    resource: Resource,
    handle: Box<dyn TransportHandle>,
    /// Whether this load delays the context's load event.
    blocking: bool,
}

pub(crate) struct FetcherInner {
    config: FetcherConfig,
    context: RefCell<Option<Rc<dyn FetchContext>>>,
    cache: RefCell<MemoryCache>,
    scheduler: Scheduler,
    callback: ResourceCallback,
    transport: Rc<dyn Transport>,
    events: LoaderEventQueue,

    loaders: RefCell<IndexMap<u64, LoaderEntry>>,
    next_loader_id: Cell<u64>,

    document_resources: RefCell<HashMap<String, WeakResource>>,
    validated_urls: RefCell<HashSet<String>>,
    preloads: RefCell<IndexMap<u64, Resource>>,
    preload_stats: RefCell<PreloadStats>,
    fetch_stats: RefCell<FetchStats>,
    detached: Cell<bool>,
}

impl FetcherInner {
    fn live_context(&self) -> Option<Rc<dyn FetchContext>> {
        if self.detached.get() {
            return None;
        }
        let context = self.context.borrow().clone()?;
        (!context.is_detached()).then_some(context)
    }

    fn memory_cache(&self) -> MemoryCache {
        self.cache.borrow().clone()
    }

    pub(super) fn cancel_loader(&self, id: u64) {
        let url = self
            .loaders
            .borrow()
            .get(&id)
            .map(|entry| entry.resource.url());
        if let Some(url) = url {
            self.fail_loader(id, ResourceError::cancelled(&url));
        }
    }

    pub(super) fn set_loader_priority(&self, id: u64, priority: ResourceLoadPriority) {
        if let Some(entry) = self.loaders.borrow().get(&id) {
            trace!(loader = id, ?priority, "Forwarding priority change");
            entry.handle.set_priority(priority);
        }
    }

    fn take_loader(&self, id: u64) -> Option<LoaderEntry> {
        self.loaders.borrow_mut().shift_remove(&id)
    }

    /// Stop a load and fail its resource. The entry is removed before the
    /// resource is told, so observers see no loader.
    fn fail_loader(&self, id: u64, error: ResourceError) {
        let Some(entry) = self.take_loader(id) else {
            return;
        };
        entry.handle.cancel();
        entry.resource.error(error);
    }

    fn dispatch(&self, loader_id: u64, event: LoaderEvent) {
        let resource = self
            .loaders
            .borrow()
            .get(&loader_id)
            .map(|entry| entry.resource.clone());
        let Some(resource) = resource else {
            trace!(loader = loader_id, event = event.name(), "Dropping event for a finished loader");
            return;
        };

        match event {
            LoaderEvent::Redirect { request, response } => {
                if resource.redirect_chain().len() >= self.config.max_redirects {
                    let error = ResourceError::network(
                        &resource.url(),
                        format!("too many redirects ({})", self.config.max_redirects),
                    );
                    self.fail_loader(loader_id, error);
                    return;
                }
                if let Some(context) = self.live_context()
                    && let Err(reason) = context.can_request(
                        resource.resource_type(),
                        request.url(),
                        resource.is_preloaded(),
                    )
                {
                    warn!(url = %request.url(), reason = %reason, "Redirect blocked");
                    let error = ResourceError::AccessCheck {
                        url: request.url().clone(),
                        reason,
                    };
                    self.fail_loader(loader_id, error);
                    return;
                }
                resource.will_follow_redirect(request, response);
            }
            LoaderEvent::Response(response) => {
                let status = response.status();
                if status == StatusCode::NOT_MODIFIED
                    && !resource.is_cache_validator()
                    && !resource.resource_type().ignores_http_status_errors()
                {
                    warn!(url = %resource.url(), "Not Modified without a revalidation");
                    let error = ResourceError::network(
                        &resource.url(),
                        "304 Not Modified for a request without validators",
                    );
                    self.fail_loader(loader_id, error);
                    return;
                }
                resource.response_received(response);
                if status.as_u16() >= 400 && !resource.resource_type().ignores_http_status_errors() {
                    let error = ResourceError::HttpStatus {
                        url: resource.url(),
                        status,
                    };
                    self.fail_loader(loader_id, error);
                }
            }
            LoaderEvent::Data(bytes) => resource.append_data(&bytes),
            LoaderEvent::Finish => {
                let entry = self.take_loader(loader_id);
                resource.finish();
                if let Some(context) = self.live_context() {
                    context.did_load_resource(&resource);
                }
                drop(entry);
            }
            LoaderEvent::Fail(error) => self.fail_loader(loader_id, error),
        }
    }
}

/// Issues and tracks loads for one loading context.
#[derive(Clone)]
pub struct ResourceFetcher {
    inner: Rc<FetcherInner>,
}

impl std::fmt::Debug for ResourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFetcher")
            .field("loaders", &self.inner.loaders.borrow().len())
            .field("preloads", &self.inner.preloads.borrow().len())
            .field("detached", &self.inner.detached.get())
            .finish()
    }
}

impl ResourceFetcher {
    /// Create a fetcher sharing `cache` (and its scheduler) with other
    /// fetchers.
    pub fn new(
        config: FetcherConfig,
        context: Rc<dyn FetchContext>,
        cache: MemoryCache,
        transport: Rc<dyn Transport>,
    ) -> Self {
        let scheduler = cache.scheduler().clone();
        Self {
            inner: Rc::new(FetcherInner {
                config,
                context: RefCell::new(Some(context)),
                cache: RefCell::new(cache),
                callback: ResourceCallback::new(scheduler.clone()),
                scheduler,
                transport,
                events: LoaderEventQueue::new(),
                loaders: RefCell::new(IndexMap::new()),
                next_loader_id: Cell::new(1),
                document_resources: RefCell::new(HashMap::new()),
                validated_urls: RefCell::new(HashSet::new()),
                preloads: RefCell::new(IndexMap::new()),
                preload_stats: RefCell::new(PreloadStats::default()),
                fetch_stats: RefCell::new(FetchStats::default()),
                detached: Cell::new(false),
            }),
        }
    }

    /// Create a fetcher with its own scheduler and memory cache built from
    /// `config.cache_config`.
    pub fn with_clock(
        config: FetcherConfig,
        context: Rc<dyn FetchContext>,
        transport: Rc<dyn Transport>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let scheduler = Scheduler::new(clock);
        let cache = MemoryCache::new(config.cache_config.clone(), scheduler);
        Self::new(config, context, cache, transport)
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.inner.config
    }

    pub fn memory_cache(&self) -> MemoryCache {
        self.inner.memory_cache()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The loading context, unless the fetcher has been detached.
    pub fn context(&self) -> Option<Rc<dyn FetchContext>> {
        self.inner.live_context()
    }

    pub fn is_detached(&self) -> bool {
        self.inner.live_context().is_none()
    }

    /// Swap the memory cache used for new resources. Returns the previous
    /// cache.
    pub fn replace_memory_cache_for_testing(&self, cache: MemoryCache) -> MemoryCache {
        std::mem::replace(&mut *self.inner.cache.borrow_mut(), cache)
    }

    /// Parse a URL for a request.
    pub fn parse_url(input: &str) -> Result<Url, FetchError> {
        Url::parse(input).map_err(|e| FetchError::InvalidUrl(format!("{input}: {e}")))
    }

    /// Request for `url` at the configured default priority.
    pub fn new_request(&self, url: Url) -> FetchRequest {
        FetchRequest::from_url(url).with_priority(self.inner.config.default_priority)
    }

    fn cache_identifier(&self, context: &dyn FetchContext) -> String {
        let identifier = context.cache_identifier();
        if identifier.is_empty() {
            self.inner.config.cache_identifier.clone()
        } else {
            identifier
        }
    }

    fn resource_env(&self) -> ResourceEnv {
        ResourceEnv {
            cache: self.memory_cache().downgrade(),
            scheduler: self.inner.scheduler.clone(),
            callback: self.inner.callback.clone(),
        }
    }

    /// Resource previously handed out for `url`, if still alive.
    pub fn document_resource(&self, url: &Url) -> Option<Resource> {
        self.inner
            .document_resources
            .borrow()
            .get(&url_without_fragment(url))
            .and_then(WeakResource::upgrade)
    }

    /// Number of URLs whose resources this fetcher still tracks.
    pub fn document_resource_count(&self) -> usize {
        self.inner.document_resources.borrow().len()
    }

    /// Serve `request` with a resource of the factory's type, attaching
    /// `client` as an observer before returning.
    pub fn request_resource(
        &self,
        request: FetchRequest,
        factory: &dyn ResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Resource, FetchError> {
        self.inner.fetch_stats.borrow_mut().requests += 1;
        let result = self.request_resource_inner(request, factory, client);
        if result.is_err() {
            self.inner.fetch_stats.borrow_mut().refused += 1;
        }
        result
    }

    fn request_resource_inner(
        &self,
        request: FetchRequest,
        factory: &dyn ResourceFactory,
        client: Option<Rc<dyn ResourceClient>>,
    ) -> Result<Resource, FetchError> {
        let Some(context) = self.inner.live_context() else {
            debug!(url = %request.url(), "Request after the context was detached");
            return Err(FetchError::Detached);
        };
        let resource_type = factory.resource_type();
        let url = request.url().clone();
        if let Err(reason) = context.can_request(resource_type, &url, request.for_preload()) {
            warn!(url = %url, resource_type = %resource_type, reason = %reason, "Request blocked");
            return Err(FetchError::Blocked { url, reason });
        }

        let identifier = self.cache_identifier(&*context);
        let url_key = url_without_fragment(&url);
        let is_static_data = url.scheme() == "data";
        let cache = self.memory_cache();

        // Main resources are never shared.
        let existing = if resource_type == ResourceType::MainResource {
            None
        } else {
            cache.lookup(&url, &identifier).or_else(|| {
                self.inner
                    .document_resources
                    .borrow()
                    .get(&url_key)
                    .and_then(WeakResource::upgrade)
            })
        };
        let existing_was_preloaded = existing.as_ref().is_some_and(Resource::is_preloaded);
        let was_dead = existing.as_ref().is_some_and(|r| !r.is_alive());

        let input = PolicyInput {
            request: &request,
            resource_type,
            is_static_data,
            context_cache_mode: context.cache_mode(),
            is_load_complete: context.is_load_complete(),
            url_validated: self.inner.validated_urls.borrow().contains(&url_key),
        };
        let (policy, reason) = policy::determine(existing.as_ref(), &input);
        debug!(
            url = %url,
            resource_type = %resource_type,
            policy = %policy,
            reason,
            "Determined revalidation policy"
        );

        let cache_mode = match request.resource_request().cache_mode() {
            CacheMode::Default => context.cache_mode(),
            mode => mode,
        };
        let resource = match (policy, existing) {
            (RevalidationPolicy::Use, Some(existing)) => {
                cache.update_for_access(&existing);
                if !request.is_link_preload() {
                    existing.set_link_preload(false);
                }
                existing
            }
            (RevalidationPolicy::Revalidate, Some(existing)) => {
                Self::start_revalidation(&existing, cache_mode);
                existing
            }
            (policy, existing) => {
                if policy == RevalidationPolicy::Reload
                    && let Some(existing) = existing
                {
                    cache.remove(&existing);
                }
                if is_static_data {
                    self.create_static_resource(&request, factory, &identifier)?
                } else {
                    self.create_resource(&request, factory, &identifier)
                }
            }
        };

        {
            let mut stats = self.inner.fetch_stats.borrow_mut();
            if is_static_data && policy != RevalidationPolicy::Use {
                stats.static_data += 1;
            } else {
                stats.record(policy, was_dead);
            }
        }

        if resource.resource_type() != resource_type {
            return Err(FetchError::TypeMismatch {
                url,
                expected: resource_type,
                actual: resource.resource_type(),
            });
        }

        // Never demote an in-flight request.
        if request.priority() > resource.priority() {
            resource.did_change_priority(request.priority());
        }

        self.remember_validated_url(&url_key);
        self.remember_document_resource(url_key, &resource);

        if request.for_preload() {
            self.preload_started(&resource);
        } else {
            self.claim_preload(&resource, existing_was_preloaded);
        }

        // Fonts wait until layout needs them unless preloaded.
        let deferred_font = resource_type == ResourceType::Font && !request.for_preload();
        let needs_load = !is_static_data
            && (policy != RevalidationPolicy::Use || resource.still_needs_load());
        if needs_load && !deferred_font && !self.start_load(&resource) {
            return Err(FetchError::LoadNotStarted(url));
        }

        if let Some(client) = client {
            let reference_policy = if request.for_preload() {
                PreloadReferencePolicy::DontMarkAsReferenced
            } else {
                PreloadReferencePolicy::MarkAsReferenced
            };
            resource.add_client(client, reference_policy);
        }
        Ok(resource)
    }

    fn create_resource(
        &self,
        request: &FetchRequest,
        factory: &dyn ResourceFactory,
        identifier: &str,
    ) -> Resource {
        let resource = Resource::new(
            next_resource_id(),
            factory.resource_type(),
            request.resource_request().clone(),
            request.options().clone(),
            request.charset().map(str::to_owned),
            request.integrity(),
            factory.create_payload(),
            self.resource_env(),
        );
        resource.set_cache_identifier(identifier);
        resource.set_link_preload(request.is_link_preload());
        if resource.resource_type() != ResourceType::MainResource {
            self.memory_cache().add(&resource);
        }
        resource
    }

    /// `data:` URLs are complete the moment they are requested.
    fn create_static_resource(
        &self,
        request: &FetchRequest,
        factory: &dyn ResourceFactory,
        identifier: &str,
    ) -> Result<Resource, FetchError> {
        let data_url =
            DataUrl::parse(request.url()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let resource = self.create_resource(request, factory, identifier);
        let response = ResourceResponse::synthesized(
            request.url().clone(),
            &data_url.mime_type,
            data_url.charset.as_deref(),
            data_url.data.len(),
        );
        resource.response_received(response);
        resource.set_resource_buffer(data_url.data);
        resource.finish();
        trace!(id = resource.id(), size = resource.encoded_size(), "Served data URL");
        Ok(resource)
    }

    fn start_revalidation(resource: &Resource, cache_mode: CacheMode) {
        let mut request = resource.resource_request();
        if let Some(response) = resource.response() {
            if let Some(etag) = response.etag() {
                request.set_revalidation_header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = response.last_modified_raw() {
                request.set_revalidation_header(IF_MODIFIED_SINCE, last_modified);
            }
        }
        if cache_mode == CacheMode::ValidateCache {
            request.set_revalidation_header(CACHE_CONTROL, "max-age=0");
        }
        debug!(url = %resource.url(), "Revalidating resource");
        resource.set_revalidating_request(request);
    }

    /// Resources are only held weakly here; released ones are dropped
    /// whenever a new URL comes in.
    fn remember_document_resource(&self, url_key: String, resource: &Resource) {
        let mut documents = self.inner.document_resources.borrow_mut();
        if !documents.contains_key(&url_key) {
            documents.retain(|_, document| document.can_upgrade());
        }
        documents.insert(url_key, resource.downgrade());
    }

    fn remember_validated_url(&self, url_key: &str) {
        let mut validated = self.inner.validated_urls.borrow_mut();
        if validated.contains(url_key) {
            return;
        }
        if validated.len() >= self.inner.config.validated_url_limit {
            validated.clear();
        }
        validated.insert(url_key.to_string());
    }

    fn preload_started(&self, resource: &Resource) {
        let mut preloads = self.inner.preloads.borrow_mut();
        if preloads.contains_key(&resource.id()) {
            return;
        }
        resource.increase_preload_count();
        preloads.insert(resource.id(), resource.clone());
        self.inner.preload_stats.borrow_mut().total += 1;
        trace!(url = %resource.url(), "Preload started");
    }

    fn claim_preload(&self, resource: &Resource, existing_was_preloaded: bool) {
        let claimed = self.inner.preloads.borrow_mut().shift_remove(&resource.id());
        let Some(preload) = claimed else {
            if existing_was_preloaded {
                debug!(url = %resource.url(), "Request could not reuse a preload");
                self.inner.preload_stats.borrow_mut().misses += 1;
            }
            return;
        };
        preload.decrease_preload_count();
        self.inner
            .preload_stats
            .borrow_mut()
            .record_claim(preload.is_loaded());
        self.update_loader_blocking(&preload);
        debug!(url = %preload.url(), loaded = preload.is_loaded(), "Preload claimed");
    }

    fn update_loader_blocking(&self, resource: &Resource) {
        let Some(loader) = resource.loader() else {
            return;
        };
        if let Some(entry) = self.inner.loaders.borrow_mut().get_mut(&loader.id()) {
            entry.blocking = resource.should_block_load_event();
        }
    }

    /// Hand `resource` to the transport. Returns false, and drops the
    /// resource from the memory cache, when the context refuses the load.
    /// A no-op after detach.
    pub fn start_load(&self, resource: &Resource) -> bool {
        let Some(context) = self.inner.live_context() else {
            debug!(url = %resource.url(), "Not starting load for a detached context");
            return false;
        };
        if !context.should_load_new_resource(resource.resource_type()) {
            debug!(url = %resource.url(), "Context refused a new load");
            self.memory_cache().remove(resource);
            return false;
        }
        if resource.is_loading() {
            return true;
        }

        let id = self.inner.next_loader_id.get();
        self.inner.next_loader_id.set(id + 1);
        resource.set_loader(LoaderRef::new(id, Rc::downgrade(&self.inner)));

        let request = resource.resource_request();
        let handle = self.inner.transport.start(&request, self.inner.events.sink(id));
        let blocking = resource.should_block_load_event();
        self.inner.loaders.borrow_mut().insert(
            id,
            LoaderEntry {
                resource: resource.clone(),
                handle,
                blocking,
            },
        );
        debug!(
            loader = id,
            url = %request.url(),
            resource_type = %resource.resource_type(),
            priority = ?request.priority(),
            blocking,
            revalidation = resource.is_cache_validator(),
            "Load started"
        );

        if resource.resource_type() == ResourceType::Font {
            font::start_load_limit_timers(
                resource,
                self.inner.config.font_short_limit,
                self.inner.config.font_long_limit,
            );
        }
        true
    }

    /// Apply queued transport events and run ready scheduler tasks until
    /// neither is left. Returns how many were processed.
    pub fn run_until_idle(&self) -> usize {
        let mut processed = 0;
        loop {
            if let Some((id, event)) = self.inner.events.pop() {
                self.inner.dispatch(id, event);
            } else if !self.inner.scheduler.run_one() {
                break;
            }
            processed += 1;
        }
        processed
    }

    /// Drive loads until every loader has finished, waking for transport
    /// events and scheduler deadlines. Must run inside a `LocalSet` when
    /// the transport spawns local tasks.
    pub async fn run_until_complete(&self) {
        loop {
            self.run_until_idle();
            if self.inner.loaders.borrow().is_empty() {
                break;
            }
            let delay = self
                .inner
                .scheduler
                .next_deadline()
                .map(|deadline| elapsed_between(self.inner.scheduler.now(), deadline));
            match delay {
                Some(delay) => {
                    let _ = tokio::time::timeout(delay, self.inner.events.wait()).await;
                }
                None => self.inner.events.wait().await,
            }
        }
    }

    pub fn loader_count(&self) -> usize {
        self.inner.loaders.borrow().len()
    }

    pub fn blocking_loader_count(&self) -> usize {
        self.inner
            .loaders
            .borrow()
            .values()
            .filter(|entry| entry.blocking)
            .count()
    }

    pub fn non_blocking_loader_count(&self) -> usize {
        self.loader_count() - self.blocking_loader_count()
    }

    pub fn is_fetching(&self) -> bool {
        !self.inner.loaders.borrow().is_empty()
    }

    /// Cancel every in-flight load. Observers are told before this returns.
    pub fn stop_fetching(&self) {
        let entries: Vec<LoaderEntry> = self
            .inner
            .loaders
            .borrow_mut()
            .drain(..)
            .map(|(_, entry)| entry)
            .collect();
        if !entries.is_empty() {
            info!(count = entries.len(), "Stopping all loads");
        }
        for entry in entries {
            entry.handle.cancel();
            let url = entry.resource.url();
            entry.resource.error(ResourceError::cancelled(&url));
        }
    }

    /// Tear down the loading context. Loads are stopped, preloads cleared,
    /// and later requests fail with [`FetchError::Detached`].
    pub fn detach(&self) {
        if self.inner.detached.replace(true) {
            return;
        }
        info!("Detaching resource fetcher");
        self.stop_fetching();
        self.clear_preloads(ClearPreloadsPolicy::ClearAllPreloads);
        self.inner.context.borrow_mut().take();
        self.inner.document_resources.borrow_mut().clear();
        self.inner.validated_urls.borrow_mut().clear();
    }

    /// Resources still held as preloads.
    pub fn preloads(&self) -> Vec<Resource> {
        self.inner.preloads.borrow().values().cloned().collect()
    }

    /// Drop outstanding preloads. Unused ones leave the memory cache.
    pub fn clear_preloads(&self, policy: ClearPreloadsPolicy) {
        let mut cleared = Vec::new();
        self.inner.preloads.borrow_mut().retain(|_, resource| {
            let clear = policy == ClearPreloadsPolicy::ClearAllPreloads || !resource.is_link_preload();
            if clear {
                cleared.push(resource.clone());
            }
            !clear
        });
        let cache = self.memory_cache();
        for resource in cleared {
            let unused = resource.is_unused_preload();
            resource.decrease_preload_count();
            if resource.preload_result() == PreloadResult::NotReferenced {
                self.inner.preload_stats.borrow_mut().never_referenced += 1;
            }
            if unused && !resource.is_preloaded() {
                cache.remove(&resource);
            }
            self.update_loader_blocking(&resource);
        }
    }

    /// Log every link preload nobody used. Returns their URLs.
    pub fn warn_unused_preloads(&self) -> Vec<Url> {
        let unused: Vec<Url> = self
            .inner
            .preloads
            .borrow()
            .values()
            .filter(|resource| resource.is_link_preload() && resource.is_unused_preload())
            .map(Resource::url)
            .collect();
        for url in &unused {
            warn!(url = %url, "Resource was preloaded but not used");
        }
        unused
    }

    pub fn preload_stats(&self) -> PreloadStats {
        let mut stats = self.inner.preload_stats.borrow().clone();
        stats.never_referenced += self
            .inner
            .preloads
            .borrow()
            .values()
            .filter(|resource| resource.preload_result() == PreloadResult::NotReferenced)
            .count() as u64;
        stats
    }

    pub fn fetch_stats(&self) -> FetchStats {
        self.inner.fetch_stats.borrow().clone()
    }
}

#[cfg(test)]
mod tests;
