//! # Resource
//!
//! One fetched artifact: its request and response metadata, buffered bytes,
//! redirect chain, lifecycle status and the observers waiting on it.
//!
//! ## Lifecycle
//!
//! ```text
//! NotStarted ──start_load──▶ Pending ──finish──▶ Cached
//!     ▲                         └──error──▶ LoadError / DecodeError
//!     └──────── revalidation ◀──── Cached
//! ```
//!
//! ## Observer protocol
//!
//! Observers live in exactly one of three sets: active, awaiting a deferred
//! callback, or finished. Every notification pass walks a snapshot of the
//! active set and skips observers removed by an earlier callback of the same
//! pass, so observers may add or remove observers from inside a callback.
//! No `RefCell` borrow is held while an observer runs.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use crate::cache::{CacheKey, MemoryCache, WeakMemoryCache};
use crate::error::{DecodeError, ResourceError};
use crate::fetcher::LoaderRef;
use crate::freshness;
use crate::http::headers::headers_match_for_reuse;
use crate::http::{FetchRequest, ResourceLoadPriority, ResourceRequest, ResourceResponse};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::variants::integrity::IntegrityMetadataSet;
use crate::variants::{DecodeInput, Payload, font};

mod callback;
mod client;
mod redirect;
pub mod text;
mod types;

pub use callback::ResourceCallback;
pub use client::ResourceClient;
pub(crate) use client::ClientSet;
pub use redirect::RedirectPair;
pub use types::{
    DataBufferingPolicy, IntegrityDisposition, PreloadReferencePolicy, PreloadResult,
    ResourceLoaderOptions, ResourceStatus, ResourceType,
};

/// Collaborators a resource reports to.
#[derive(Clone)]
pub(crate) struct ResourceEnv {
    pub cache: WeakMemoryCache,
    pub scheduler: Scheduler,
    pub callback: ResourceCallback,
}

pub(crate) struct ResourceInner {
    id: u64,
    resource_type: ResourceType,
    env: ResourceEnv,
    request: RefCell<ResourceRequest>,
    request_before_revalidation: RefCell<Option<ResourceRequest>>,
    options: RefCell<ResourceLoaderOptions>,
    cache_identifier: RefCell<String>,
    charset_hint: Option<String>,
    integrity_metadata: IntegrityMetadataSet,
    integrity_disposition: Cell<IntegrityDisposition>,

    status: Cell<ResourceStatus>,
    error: RefCell<Option<ResourceError>>,
    response: RefCell<Option<ResourceResponse>>,
    response_timestamp: Cell<Option<DateTime<Utc>>>,
    load_finish_time: Cell<Option<DateTime<Utc>>>,
    data: RefCell<Option<BytesMut>>,
    encoded_size: Cell<usize>,
    redirect_chain: RefCell<Vec<RedirectPair>>,
    is_revalidating: Cell<bool>,
    payload: RefCell<Payload>,

    clients: RefCell<ClientSet>,
    clients_awaiting_callback: RefCell<ClientSet>,
    finished_clients: RefCell<ClientSet>,
    clients_added_during_revalidation: RefCell<ClientSet>,
    is_alive: Cell<bool>,

    loader: RefCell<Option<LoaderRef>>,
    cancel_timer: RefCell<Option<TaskHandle>>,
    requested_from_networking_layer: Cell<bool>,

    preload_count: Cell<u32>,
    preload_result: Cell<PreloadResult>,
    link_preload: Cell<bool>,
}

impl Drop for ResourceInner {
    fn drop(&mut self) {
        if let Some(timer) = self.cancel_timer.get_mut().take() {
            timer.cancel();
        }
        if let Some(cache) = self.env.cache.upgrade() {
            let key = CacheKey::new(self.request.get_mut().url(), self.cache_identifier.get_mut());
            cache.resource_released(&key, self.id);
        }
    }
}

/// Shared handle to a resource. Clones refer to the same resource.
#[derive(Clone)]
pub struct Resource {
    inner: Rc<ResourceInner>,
}

/// Non-owning handle to a resource.
#[derive(Clone)]
pub struct WeakResource {
    inner: Weak<ResourceInner>,
}

impl WeakResource {
    pub fn upgrade(&self) -> Option<Resource> {
        self.inner.upgrade().map(|inner| Resource { inner })
    }

    /// Whether any strong handle is left.
    pub fn can_upgrade(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.inner.id)
            .field("type", &self.inner.resource_type)
            .field("url", &self.url().as_str())
            .field("status", &self.status())
            .field("revalidating", &self.is_cache_validator())
            .finish()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Resource {}

impl Resource {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        resource_type: ResourceType,
        request: ResourceRequest,
        options: ResourceLoaderOptions,
        charset_hint: Option<String>,
        integrity: Option<&str>,
        payload: Payload,
        env: ResourceEnv,
    ) -> Self {
        trace!(id, url = %request.url(), resource_type = %resource_type, "Creating resource");
        Self {
            inner: Rc::new(ResourceInner {
                id,
                resource_type,
                env,
                request: RefCell::new(request),
                request_before_revalidation: RefCell::new(None),
                options: RefCell::new(options),
                cache_identifier: RefCell::new(String::new()),
                charset_hint,
                integrity_metadata: integrity.map(IntegrityMetadataSet::parse).unwrap_or_default(),
                integrity_disposition: Cell::new(IntegrityDisposition::NotChecked),
                status: Cell::new(ResourceStatus::NotStarted),
                error: RefCell::new(None),
                response: RefCell::new(None),
                response_timestamp: Cell::new(None),
                load_finish_time: Cell::new(None),
                data: RefCell::new(None),
                encoded_size: Cell::new(0),
                redirect_chain: RefCell::new(Vec::new()),
                is_revalidating: Cell::new(false),
                payload: RefCell::new(payload),
                clients: RefCell::new(ClientSet::default()),
                clients_awaiting_callback: RefCell::new(ClientSet::default()),
                finished_clients: RefCell::new(ClientSet::default()),
                clients_added_during_revalidation: RefCell::new(ClientSet::default()),
                is_alive: Cell::new(false),
                loader: RefCell::new(None),
                cancel_timer: RefCell::new(None),
                requested_from_networking_layer: Cell::new(false),
                preload_count: Cell::new(0),
                preload_result: Cell::new(PreloadResult::NotReferenced),
                link_preload: Cell::new(false),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakResource {
        WeakResource {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.inner.resource_type
    }

    /// URL of the original request. Redirects do not change it.
    pub fn url(&self) -> url::Url {
        self.inner.request.borrow().url().clone()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.inner.request.borrow().url(), &self.inner.cache_identifier.borrow())
    }

    pub fn resource_request(&self) -> ResourceRequest {
        self.inner.request.borrow().clone()
    }

    /// Request of the last redirect hop, or the original request.
    pub fn last_resource_request(&self) -> ResourceRequest {
        self.inner
            .redirect_chain
            .borrow()
            .last()
            .map(|pair| pair.request.clone())
            .unwrap_or_else(|| self.resource_request())
    }

    pub fn options(&self) -> ResourceLoaderOptions {
        self.inner.options.borrow().clone()
    }

    pub(crate) fn set_data_buffering_policy(&self, policy: DataBufferingPolicy) {
        self.inner.options.borrow_mut().data_buffering_policy = policy;
    }

    pub fn cache_identifier(&self) -> String {
        self.inner.cache_identifier.borrow().clone()
    }

    pub(crate) fn set_cache_identifier(&self, identifier: &str) {
        *self.inner.cache_identifier.borrow_mut() = identifier.to_string();
    }

    pub fn charset_hint(&self) -> Option<&str> {
        self.inner.charset_hint.as_deref()
    }

    pub fn priority(&self) -> ResourceLoadPriority {
        self.inner.request.borrow().priority()
    }

    /// Raise or lower the load priority; forwarded to the loader if any.
    pub fn did_change_priority(&self, priority: ResourceLoadPriority) {
        self.inner.request.borrow_mut().set_priority(priority);
        let loader = self.inner.loader.borrow().clone();
        if let Some(loader) = loader {
            loader.did_change_priority(priority);
        }
    }

    pub fn status(&self) -> ResourceStatus {
        self.inner.status.get()
    }

    pub(crate) fn set_status(&self, status: ResourceStatus) {
        self.inner.status.set(status);
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loader.borrow().is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.status() > ResourceStatus::Pending
    }

    pub fn still_needs_load(&self) -> bool {
        self.status() < ResourceStatus::Pending
    }

    pub fn error_occurred(&self) -> bool {
        matches!(
            self.status(),
            ResourceStatus::LoadError | ResourceStatus::DecodeError
        )
    }

    pub fn resource_error(&self) -> Option<ResourceError> {
        self.inner.error.borrow().clone()
    }

    pub fn response(&self) -> Option<ResourceResponse> {
        self.inner.response.borrow().clone()
    }

    pub fn has_response(&self) -> bool {
        self.inner.response.borrow().is_some()
    }

    pub fn response_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.response_timestamp.get()
    }

    pub fn load_finish_time(&self) -> Option<DateTime<Utc>> {
        self.inner.load_finish_time.get()
    }

    /// Copy of the buffered encoded bytes.
    pub fn data(&self) -> Option<Bytes> {
        self.inner
            .data
            .borrow()
            .as_ref()
            .map(|data| Bytes::copy_from_slice(data))
    }

    pub fn has_data(&self) -> bool {
        self.inner.data.borrow().is_some()
    }

    /// Bytes received for the current response, whether or not they are
    /// still buffered.
    pub fn encoded_size(&self) -> usize {
        self.inner.encoded_size.get()
    }

    /// Bytes currently held in the encoded buffer.
    pub fn encoded_size_memory_usage(&self) -> usize {
        self.inner.data.borrow().as_ref().map_or(0, |d| d.len())
    }

    pub fn decoded_size(&self) -> usize {
        self.inner.payload.borrow().decoded_size()
    }

    /// Memory accounted to this resource by the memory cache.
    pub fn size(&self) -> usize {
        self.encoded_size_memory_usage() + self.decoded_size()
    }

    pub fn redirect_chain(&self) -> Vec<RedirectPair> {
        self.inner.redirect_chain.borrow().clone()
    }

    /// True while a revalidation request is outstanding.
    pub fn is_cache_validator(&self) -> bool {
        self.inner.is_revalidating.get()
    }

    pub fn integrity_disposition(&self) -> IntegrityDisposition {
        self.inner.integrity_disposition.get()
    }

    pub fn integrity_metadata(&self) -> &IntegrityMetadataSet {
        &self.inner.integrity_metadata
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive.get()
    }

    pub fn has_clients_or_observers(&self) -> bool {
        !self.inner.clients.borrow().is_empty()
            || !self.inner.clients_awaiting_callback.borrow().is_empty()
            || !self.inner.finished_clients.borrow().is_empty()
    }

    pub fn has_client(&self, client: &Rc<dyn ResourceClient>) -> bool {
        self.inner.clients.borrow().contains(client)
            || self.inner.clients_awaiting_callback.borrow().contains(client)
            || self.inner.finished_clients.borrow().contains(client)
    }

    /// Observers not yet told about completion.
    pub fn active_client_count(&self) -> usize {
        self.inner.clients.borrow().len()
    }

    pub fn awaiting_client_count(&self) -> usize {
        self.inner.clients_awaiting_callback.borrow().len()
    }

    pub fn finished_client_count(&self) -> usize {
        self.inner.finished_clients.borrow().len()
    }

    pub fn preload_count(&self) -> u32 {
        self.inner.preload_count.get()
    }

    pub fn is_preloaded(&self) -> bool {
        self.inner.preload_count.get() > 0
    }

    pub(crate) fn increase_preload_count(&self) {
        self.inner.preload_count.set(self.inner.preload_count.get() + 1);
    }

    pub(crate) fn decrease_preload_count(&self) {
        self.inner
            .preload_count
            .set(self.inner.preload_count.get().saturating_sub(1));
    }

    pub fn preload_result(&self) -> PreloadResult {
        self.inner.preload_result.get()
    }

    pub fn is_unused_preload(&self) -> bool {
        self.is_preloaded() && self.preload_result() == PreloadResult::NotReferenced
    }

    pub fn is_link_preload(&self) -> bool {
        self.inner.link_preload.get()
    }

    pub(crate) fn set_link_preload(&self, link_preload: bool) {
        self.inner.link_preload.set(link_preload);
    }

    /// Whether this load delays the load event of its context.
    pub fn should_block_load_event(&self) -> bool {
        !self.is_link_preload()
            && !self.is_preloaded()
            && self.resource_type().is_load_event_blocking()
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.env.scheduler
    }

    pub(crate) fn payload(&self) -> Ref<'_, Payload> {
        self.inner.payload.borrow()
    }

    pub(crate) fn payload_mut(&self) -> RefMut<'_, Payload> {
        self.inner.payload.borrow_mut()
    }

    /// Mutate the variant payload, reporting any size change to the cache.
    pub(crate) fn update_payload(&self, f: impl FnOnce(&mut Payload)) {
        let old_size = self.size();
        f(&mut self.inner.payload.borrow_mut());
        self.size_changed(old_size);
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.env.scheduler.now()
    }

    fn memory_cache(&self) -> Option<MemoryCache> {
        self.inner.env.cache.upgrade()
    }

    /// Report a size change to the memory cache.
    fn size_changed(&self, old_size: usize) {
        let new_size = self.size();
        if new_size != old_size
            && let Some(cache) = self.memory_cache()
        {
            cache.update(self, old_size, new_size);
        }
    }

    // ---- observers ----

    /// Attach an observer.
    ///
    /// When a response or error is already present, types without
    /// synchronous cache hits receive their callbacks from a deferred task;
    /// the others are notified before this returns.
    pub fn add_client(&self, client: Rc<dyn ResourceClient>, policy: PreloadReferencePolicy) {
        self.will_add_client_or_observer(policy);

        if self.is_cache_validator() {
            self.inner.clients.borrow_mut().add(client.clone());
            self.inner
                .clients_added_during_revalidation
                .borrow_mut()
                .add(client);
            return;
        }

        if (self.error_occurred() || self.has_response())
            && !self.resource_type().needs_synchronous_cache_hit()
        {
            self.inner.clients_awaiting_callback.borrow_mut().add(client);
            self.inner.env.callback.schedule(self);
            return;
        }

        self.inner.clients.borrow_mut().add(client.clone());
        self.did_add_client(&client);
    }

    fn will_add_client_or_observer(&self, policy: PreloadReferencePolicy) {
        if policy == PreloadReferencePolicy::MarkAsReferenced
            && self.preload_result() == PreloadResult::NotReferenced
        {
            let result = if self.is_loaded() {
                PreloadResult::ReferencedWhileComplete
            } else if self.inner.requested_from_networking_layer.get() {
                PreloadResult::ReferencedWhileLoading
            } else {
                PreloadResult::Referenced
            };
            self.inner.preload_result.set(result);
        }

        if !self.has_clients_or_observers() {
            self.inner.is_alive.set(true);
            if let Some(cache) = self.memory_cache() {
                cache.make_live(self);
            }
        }
    }

    fn did_add_client(&self, client: &Rc<dyn ResourceClient>) {
        if self.resource_type().is_raw_family() && !self.replay_raw_events(client) {
            return;
        }

        if self.is_loaded() {
            client.notify_finished(self);
            let taken = self.inner.clients.borrow_mut().take(client);
            if let Some((client, count)) = taken {
                self.inner
                    .finished_clients
                    .borrow_mut()
                    .add_counted(client, count);
            }
        }

        if self.resource_type() == ResourceType::Font && self.has_client(client) {
            font::did_add_client(self, client);
        }
    }

    /// Bring a late raw observer up to date. Returns false if the observer
    /// detached itself along the way.
    fn replay_raw_events(&self, client: &Rc<dyn ResourceClient>) -> bool {
        for pair in self.redirect_chain() {
            client.redirect_received(self, &pair.request, &pair.redirect_response);
            if !self.has_client(client) {
                return false;
            }
        }
        if let Some(response) = self.response() {
            client.response_received(self, &response);
            if !self.has_client(client) {
                return false;
            }
        }
        if let Some(data) = self.data() {
            client.data_received(self, &data);
            if !self.has_client(client) {
                return false;
            }
        }
        true
    }

    /// Detach one registration of an observer.
    pub fn remove_client(&self, client: &Rc<dyn ResourceClient>) {
        let removed = if self.inner.finished_clients.borrow().contains(client) {
            self.inner.finished_clients.borrow_mut().remove_one(client)
        } else if self.inner.clients_awaiting_callback.borrow().contains(client) {
            self.inner
                .clients_awaiting_callback
                .borrow_mut()
                .remove_one(client)
        } else {
            self.inner.clients.borrow_mut().remove_one(client)
        };
        if !removed {
            return;
        }

        if self.inner.clients_awaiting_callback.borrow().is_empty() {
            self.inner.env.callback.cancel(self);
        }
        self.did_remove_client_or_observer();
    }

    fn did_remove_client_or_observer(&self) {
        if self.has_clients_or_observers() || !self.is_alive() {
            return;
        }
        self.inner.is_alive.set(false);
        self.all_clients_and_observers_removed();

        let Some(cache) = self.memory_cache() else {
            return;
        };
        cache.make_dead(self);
        // no-store content over https must not linger in memory.
        if self.has_cache_control_no_store_header() && self.url().scheme() == "https" {
            cache.remove(self);
            cache.prune(None);
        } else {
            cache.prune(Some(self));
        }
    }

    fn all_clients_and_observers_removed(&self) {
        let loader = self.inner.loader.borrow().clone();
        let Some(loader) = loader else {
            return;
        };

        if self.resource_type() == ResourceType::MainResource {
            loader.cancel();
            return;
        }

        if self
            .inner
            .cancel_timer
            .borrow()
            .as_ref()
            .is_some_and(TaskHandle::is_pending)
        {
            return;
        }
        let weak = self.downgrade();
        let timer = self.inner.env.scheduler.post("resource-cancel", move || {
            if let Some(resource) = weak.upgrade() {
                resource.cancel_timer_fired();
            }
        });
        *self.inner.cancel_timer.borrow_mut() = Some(timer);
    }

    fn cancel_timer_fired(&self) {
        if self.has_clients_or_observers() {
            return;
        }
        let loader = self.inner.loader.borrow().clone();
        if let Some(loader) = loader {
            debug!(url = %self.url(), "Cancelling load with no remaining observers");
            loader.cancel();
        }
    }

    /// Deliver to observers queued by a deferred attach.
    pub(crate) fn finish_pending_clients(&self) {
        let to_notify = self.inner.clients_awaiting_callback.borrow().snapshot();
        for client in to_notify {
            // Skip observers removed by an earlier callback.
            let taken = self.inner.clients_awaiting_callback.borrow_mut().take(&client);
            let Some((client, count)) = taken else {
                continue;
            };
            self.inner.clients.borrow_mut().add_counted(client.clone(), count);
            if !self.is_cache_validator() {
                self.did_add_client(&client);
            }
        }

        let scheduled = self.inner.env.callback.is_scheduled(self);
        if scheduled && self.inner.clients_awaiting_callback.borrow().is_empty() {
            self.inner.env.callback.cancel(self);
        }
    }

    /// Walk a snapshot of active observers, skipping any that were removed
    /// by an earlier callback of the same pass.
    fn for_each_client(&self, mut f: impl FnMut(&Rc<dyn ResourceClient>)) {
        let snapshot = self.inner.clients.borrow().snapshot();
        for client in snapshot {
            if !self.inner.clients.borrow().contains(&client) {
                continue;
            }
            f(&client);
        }
    }

    pub(crate) fn notify_font_short_limit(&self) {
        self.for_each_client(|client| client.font_load_short_limit_exceeded(self));
    }

    pub(crate) fn notify_font_long_limit(&self) {
        self.for_each_client(|client| client.font_load_long_limit_exceeded(self));
    }

    fn check_notify(&self) {
        if self.is_loading() {
            return;
        }
        if self.resource_type() == ResourceType::Font {
            font::stop_load_limit_timers(self);
        }
        self.for_each_client(|client| {
            let taken = self.inner.clients.borrow_mut().take(client);
            if let Some((client, count)) = taken {
                self.inner
                    .finished_clients
                    .borrow_mut()
                    .add_counted(client.clone(), count);
                client.notify_finished(self);
            }
        });
    }

    // ---- loading ----

    pub(crate) fn set_loader(&self, loader: LoaderRef) {
        *self.inner.loader.borrow_mut() = Some(loader);
        self.inner.status.set(ResourceStatus::Pending);
        self.inner.requested_from_networking_layer.set(true);
    }

    pub(crate) fn loader(&self) -> Option<LoaderRef> {
        self.inner.loader.borrow().clone()
    }

    /// Turn a loaded resource into a cache validator carrying `request`.
    pub(crate) fn set_revalidating_request(&self, request: ResourceRequest) {
        debug_assert!(self.inner.redirect_chain.borrow().is_empty());
        if self.resource_type() == ResourceType::Font {
            font::reset_for_revalidation(self);
        }
        self.inner.is_revalidating.set(true);
        let original = self.inner.request.replace(request);
        *self.inner.request_before_revalidation.borrow_mut() = Some(original);
        self.inner.status.set(ResourceStatus::NotStarted);
    }

    /// Leave revalidation, putting back the request without validators.
    fn end_revalidation(&self) {
        self.inner.is_revalidating.set(false);
        if let Some(original) = self.inner.request_before_revalidation.borrow_mut().take() {
            *self.inner.request.borrow_mut() = original;
        }
    }

    pub fn response_received(&self, mut response: ResourceResponse) {
        let now = self.now();
        response.set_response_time(now);
        self.inner.response_timestamp.set(Some(now));

        if self.is_cache_validator() {
            if response.status() == StatusCode::NOT_MODIFIED {
                self.revalidation_succeeded(&response);
                self.notify_raw_response();
                self.replay_data_after_revalidation();
                return;
            }
            self.revalidation_failed();
        }

        debug!(
            url = %self.url(),
            status = response.status().as_u16(),
            mime_type = response.mime_type(),
            "Response received"
        );
        *self.inner.response.borrow_mut() = Some(response);
        self.notify_raw_response();
    }

    fn notify_raw_response(&self) {
        if !self.resource_type().is_raw_family() {
            return;
        }
        let Some(response) = self.response() else {
            return;
        };
        self.for_each_client(|client| client.response_received(self, &response));
    }

    /// Raw observers that attached while the revalidation was outstanding
    /// never saw the cached body. A 304 keeps that body, so replay it.
    fn replay_data_after_revalidation(&self) {
        let late = std::mem::take(&mut *self.inner.clients_added_during_revalidation.borrow_mut());
        if !self.resource_type().is_raw_family() {
            return;
        }
        let Some(data) = self.data() else {
            return;
        };
        for client in late.snapshot() {
            if self.inner.clients.borrow().contains(&client) {
                client.data_received(self, &data);
            }
        }
    }

    fn revalidation_succeeded(&self, validating: &ResourceResponse) {
        debug!(url = %self.url(), "Revalidation succeeded");
        if let Some(response) = self.inner.response.borrow_mut().as_mut() {
            response.merge_not_modified(validating);
            if let Some(at) = validating.response_time() {
                response.set_response_time(at);
            }
        }
        self.end_revalidation();
    }

    fn revalidation_failed(&self) {
        debug!(url = %self.url(), "Revalidation failed");
        debug_assert!(self.inner.redirect_chain.borrow().is_empty());
        let old_size = self.size();
        self.inner.data.borrow_mut().take();
        if let Some(cache) = self.inner.payload.borrow_mut().cache_mut() {
            cache.destroy_decoded_data_for_failed_revalidation();
        }
        self.inner.response.borrow_mut().take();
        self.inner.encoded_size.set(0);
        self.inner
            .integrity_disposition
            .set(IntegrityDisposition::NotChecked);
        self.inner.clients_added_during_revalidation.borrow_mut().clear();
        self.end_revalidation();
        self.size_changed(old_size);
    }

    /// Record a redirect hop. A redirect during revalidation means the cached
    /// entity is gone.
    pub fn will_follow_redirect(
        &self,
        new_request: ResourceRequest,
        mut redirect_response: ResourceResponse,
    ) -> bool {
        if self.is_cache_validator() {
            self.revalidation_failed();
        }
        redirect_response.set_response_time(self.now());
        debug!(
            from = %redirect_response.url(),
            to = %new_request.url(),
            status = redirect_response.status().as_u16(),
            "Following redirect"
        );
        let pair = RedirectPair::new(new_request, redirect_response);
        self.inner.redirect_chain.borrow_mut().push(pair.clone());

        if self.resource_type().is_raw_family() {
            self.for_each_client(|client| {
                client.redirect_received(self, &pair.request, &pair.redirect_response)
            });
        }
        true
    }

    pub fn append_data(&self, bytes: &[u8]) {
        if self.is_cache_validator() || self.error_occurred() {
            warn!(url = %self.url(), "Dropping data received in an unexpected state");
            return;
        }

        let buffering = self.inner.options.borrow().data_buffering_policy;
        if buffering == DataBufferingPolicy::BufferData {
            let old_size = self.size();
            let len = {
                let mut data = self.inner.data.borrow_mut();
                let buffer = data.get_or_insert_with(BytesMut::new);
                buffer.extend_from_slice(bytes);
                buffer.len()
            };
            self.inner.encoded_size.set(len);
            self.size_changed(old_size);
        }

        if self.resource_type().is_raw_family() {
            self.for_each_client(|client| client.data_received(self, bytes));
        }
    }

    /// Install a complete body in one go, e.g. for `data:` URLs.
    pub(crate) fn set_resource_buffer(&self, data: Bytes) {
        let old_size = self.size();
        self.inner.encoded_size.set(data.len());
        *self.inner.data.borrow_mut() = Some(BytesMut::from(&data[..]));
        self.size_changed(old_size);
    }

    fn clear_data(&self) {
        let old_size = self.size();
        self.inner.data.borrow_mut().take();
        self.size_changed(old_size);
    }

    /// Terminal success. Runs the integrity check and the variant decoder
    /// before observers are told.
    pub fn finish(&self) {
        debug_assert!(!self.is_cache_validator());
        self.inner.load_finish_time.set(Some(self.now()));
        if !self.error_occurred() {
            self.inner.status.set(ResourceStatus::Cached);
        }
        self.inner.loader.borrow_mut().take();

        if self.status() == ResourceStatus::Cached {
            self.check_integrity();
            self.decode_payload();
        }
        debug!(
            url = %self.url(),
            resource_type = %self.resource_type(),
            status = ?self.status(),
            encoded_size = self.encoded_size(),
            "Resource finished"
        );
        self.check_notify();
    }

    /// Terminal failure. Observers are told; cancellations and failures of
    /// anything but an unused preload leave the memory cache.
    pub fn error(&self, error: ResourceError) {
        self.inner.clients_added_during_revalidation.borrow_mut().clear();
        self.end_revalidation();
        let cancellation = error.is_cancellation();
        if cancellation {
            debug!(url = %self.url(), "Resource load cancelled");
        } else {
            warn!(url = %self.url(), error = %error, "Resource load failed");
        }
        *self.inner.error.borrow_mut() = Some(error);

        if (cancellation || !self.is_preloaded())
            && let Some(cache) = self.memory_cache()
        {
            cache.remove(self);
        }
        if !self.error_occurred() {
            self.inner.status.set(ResourceStatus::LoadError);
        }
        self.clear_data();
        self.inner.loader.borrow_mut().take();
        self.check_notify();
    }

    fn check_integrity(&self) {
        if self.integrity_disposition() != IntegrityDisposition::NotChecked
            || self.inner.integrity_metadata.is_empty()
            || !matches!(self.resource_type(), ResourceType::Script | ResourceType::StyleSheet)
        {
            return;
        }
        let passed = {
            let data = self.inner.data.borrow();
            self.inner
                .integrity_metadata
                .matches(data.as_deref().unwrap_or(&[]))
        };
        if passed {
            self.inner.integrity_disposition.set(IntegrityDisposition::Passed);
        } else {
            warn!(url = %self.url(), "Integrity metadata did not match the response body");
            self.inner.integrity_disposition.set(IntegrityDisposition::Failed);
        }
    }

    /// Materialize the decoded payload if the variant has one and it is
    /// missing. Decode failure is terminal.
    fn decode_payload(&self) {
        if !self
            .inner
            .payload
            .borrow()
            .cache()
            .is_some_and(|c| !c.has_decoded_data())
        {
            return;
        }
        let Some(response) = self.response() else {
            return;
        };

        let old_size = self.size();
        let result = {
            let data = self.inner.data.borrow();
            let mut payload = self.inner.payload.borrow_mut();
            match payload.cache_mut() {
                Some(cache) => cache.decode(DecodeInput {
                    data: data.as_deref().unwrap_or(&[]),
                    response: &response,
                    charset_hint: self.inner.charset_hint.as_deref(),
                }),
                None => Ok(()),
            }
        };
        self.size_changed(old_size);

        if let Err(source) = result {
            self.decode_failed(source);
        }
    }

    fn decode_failed(&self, source: DecodeError) {
        warn!(url = %self.url(), error = %source, "Failed to decode resource");
        *self.inner.error.borrow_mut() = Some(ResourceError::Decode {
            url: self.url(),
            source,
        });
        self.inner.status.set(ResourceStatus::DecodeError);
        if let Some(cache) = self.memory_cache() {
            cache.remove(self);
        }
    }

    /// Make sure the decoded payload exists, rebuilding it from the encoded
    /// bytes after a prune. Returns whether a payload is available.
    pub(crate) fn ensure_decoded(&self) -> bool {
        if !self.is_loaded() || self.error_occurred() {
            return false;
        }
        if !self.inner.payload.borrow().has_decoded_data() && self.has_data() {
            self.decode_payload();
        }
        !self.error_occurred() && self.inner.payload.borrow().has_decoded_data()
    }

    // ---- freshness ----

    /// Current age of the stored response.
    pub fn current_age(&self) -> Option<TimeDelta> {
        let response = self.inner.response.borrow();
        let response = response.as_ref()?;
        let timestamp = self.response_timestamp().unwrap_or_else(|| self.now());
        Some(freshness::current_age(response, timestamp, self.now()))
    }

    pub fn freshness_lifetime(&self) -> Option<TimeDelta> {
        let response = self.inner.response.borrow();
        let response = response.as_ref()?;
        let timestamp = self.response_timestamp().unwrap_or_else(|| self.now());
        Some(freshness::freshness_lifetime(response, timestamp))
    }

    pub fn staleness_lifetime(&self) -> Option<TimeDelta> {
        self.inner
            .response
            .borrow()
            .as_ref()
            .and_then(freshness::staleness_lifetime)
    }

    /// The stored response is stale, or the stored request forbids caching.
    pub fn must_revalidate_due_to_cache_headers(&self) -> bool {
        let now = self.now();
        let usable = {
            let response = self.inner.response.borrow();
            response.as_ref().is_some_and(|response| {
                let timestamp = self.response_timestamp().unwrap_or(now);
                freshness::can_use_response(response, timestamp, now)
            })
        };
        let request = self.inner.request.borrow();
        !usable
            || request.cache_control_contains_no_cache()
            || request.cache_control_contains_no_store()
    }

    /// Every redirect hop is fresh and none was requested with
    /// no-cache/no-store.
    pub fn can_reuse_redirect_chain(&self) -> bool {
        let now = self.now();
        let fallback = self.response_timestamp().unwrap_or(now);
        self.inner
            .redirect_chain
            .borrow()
            .iter()
            .all(|pair| pair.is_reusable(fallback, now))
    }

    pub fn has_cache_control_no_store_header(&self) -> bool {
        self.inner
            .response
            .borrow()
            .as_ref()
            .is_some_and(ResourceResponse::cache_control_contains_no_store)
            || self.inner.request.borrow().cache_control_contains_no_store()
    }

    pub fn can_use_cache_validator(&self) -> bool {
        // Observed scripts may already have dropped their bytes.
        if self.resource_type() == ResourceType::Script && self.has_clients_or_observers() {
            return false;
        }
        if self.is_loading() || self.error_occurred() {
            return false;
        }
        if self.has_cache_control_no_store_header() {
            return false;
        }
        if !self.inner.redirect_chain.borrow().is_empty() {
            return false;
        }
        self.inner
            .response
            .borrow()
            .as_ref()
            .is_some_and(ResourceResponse::has_cache_validator_fields)
            || self.inner.request.borrow().has_cache_validator_fields()
    }

    /// `Vary: *`, or a varied-on request header that differs.
    pub fn must_reload_due_to_vary_header(&self, new_request: &ResourceRequest) -> bool {
        let Some(names) = self.inner.response.borrow().as_ref().and_then(ResourceResponse::vary)
        else {
            return false;
        };
        let old_request = self.inner.request.borrow();
        names.iter().any(|name| {
            name == "*"
                || !old_request
                    .headers()
                    .get_all(name.as_str())
                    .iter()
                    .eq(new_request.headers().get_all(name.as_str()).iter())
        })
    }

    pub fn must_refetch_due_to_integrity_metadata(&self, request: &FetchRequest) -> bool {
        let Some(attribute) = request.integrity() else {
            return false;
        };
        let requested = IntegrityMetadataSet::parse(attribute);
        !requested.is_empty() && requested != self.inner.integrity_metadata
    }

    /// Whether an in-flight or cached raw load can serve `request`. Other
    /// types are always reusable here.
    pub fn can_reuse(&self, request: &FetchRequest) -> bool {
        if !self.resource_type().is_raw_family() {
            return true;
        }
        if self.inner.options.borrow().data_buffering_policy == DataBufferingPolicy::DoNotBufferData
        {
            return false;
        }
        let old = self.inner.request.borrow();
        let new = request.resource_request();
        old.method() == new.method()
            && old.body() == new.body()
            && old.allow_stored_credentials() == new.allow_stored_credentials()
            && headers_match_for_reuse(old.headers(), new.headers())
    }

    // ---- memory ----

    /// Release memory. Unobserved resources drop rebuildable decoded data;
    /// observed ones keep it and may drop encoded bytes instead.
    pub fn prune(&self) {
        let old_size = self.size();
        let encoded_available = self.has_data();
        if self.has_clients_or_observers() {
            let drop_encoded = {
                let payload = self.inner.payload.borrow();
                encoded_available
                    && payload.has_decoded_data()
                    && payload.survives_without_encoded_data()
            };
            if drop_encoded {
                self.inner.data.borrow_mut().take();
            }
        } else if let Some(cache) = self.inner.payload.borrow_mut().cache_mut() {
            cache.destroy_decoded_data(encoded_available);
        }
        let new_size = self.size();
        if new_size != old_size {
            trace!(url = %self.url(), old_size, new_size, "Pruned resource");
        }
        self.size_changed(old_size);
    }

    /// Mark the decoded payload as recently used.
    pub fn did_access_decoded_data(&self) {
        if let Some(cache) = self.memory_cache() {
            cache.update_decoded_resource(self);
            cache.prune(None);
        }
    }
}
