//! Helpers for driving the engine in tests: a fixed clock, a transport that
//! records loads instead of performing them, and an observer that records
//! every callback.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use url::Url;

use crate::cache::{CacheConfig, MemoryCache};
use crate::clock::ManualClock;
use crate::config::FetcherConfig;
use crate::error::ResourceError;
use crate::fetcher::{DefaultFetchContext, ResourceFetcher, next_resource_id};
use crate::http::{FetchRequest, ResourceLoadPriority, ResourceRequest, ResourceResponse};
use crate::resource::{Resource, ResourceCallback, ResourceClient, ResourceEnv};
use crate::scheduler::Scheduler;
use crate::transport::{LoaderSink, Transport, TransportHandle};
use crate::variants::ResourceFactory;

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        $crate::init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

#[allow(unused_imports)]
pub use crate::init_test_tracing;

/// Instant every test clock starts at.
pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn test_clock() -> Rc<ManualClock> {
    Rc::new(ManualClock::new(test_start()))
}

/// Format an instant as an HTTP-date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// # Panics
///
/// On an unparseable URL.
pub fn url(input: &str) -> Url {
    Url::parse(input).unwrap_or_else(|e| panic!("invalid test URL {input}: {e}"))
}

pub fn response(target: &str, status: u16, headers: &[(&str, &str)]) -> ResourceResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = ResourceResponse::new(url(target), status, HeaderMap::new());
    for (name, value) in headers {
        response = response.with_header(name, value);
    }
    response
}

pub fn request(target: &str) -> FetchRequest {
    FetchRequest::from_url(url(target))
}

#[derive(Debug, Default)]
struct MockLoadState {
    cancelled: Cell<bool>,
    priority: Cell<Option<ResourceLoadPriority>>,
}

/// A load handed to [`MockTransport`]. Tests play the network through its
/// sink.
#[derive(Clone)]
pub struct MockLoad {
    request: ResourceRequest,
    sink: LoaderSink,
    state: Rc<MockLoadState>,
}

impl MockLoad {
    pub fn request(&self) -> &ResourceRequest {
        &self.request
    }

    pub fn url(&self) -> &Url {
        self.request.url()
    }

    pub fn sink(&self) -> &LoaderSink {
        &self.sink
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// Last priority forwarded to the handle.
    pub fn priority(&self) -> Option<ResourceLoadPriority> {
        self.state.priority.get()
    }

    pub fn redirect(&self, to: &str, response: ResourceResponse) {
        let next = self.request.redirected(url(to), response.status());
        self.sink.redirect(next, response);
    }

    pub fn respond(&self, response: ResourceResponse) {
        self.sink.response(response);
    }

    pub fn data(&self, data: &'static [u8]) {
        self.sink.data(Bytes::from_static(data));
    }

    pub fn finish(&self) {
        self.sink.finish();
    }

    pub fn fail(&self, error: ResourceError) {
        self.sink.fail(error);
    }

    /// Response, body and finish in one go.
    pub fn complete(&self, response: ResourceResponse, body: &'static [u8]) {
        self.respond(response);
        if !body.is_empty() {
            self.data(body);
        }
        self.finish();
    }
}

struct MockHandle {
    state: Rc<MockLoadState>,
}

impl TransportHandle for MockHandle {
    fn cancel(&self) {
        self.state.cancelled.set(true);
    }

    fn set_priority(&self, priority: ResourceLoadPriority) {
        self.state.priority.set(Some(priority));
    }
}

/// Transport that records every started load.
#[derive(Default)]
pub struct MockTransport {
    loads: RefCell<Vec<MockLoad>>,
}

impl MockTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn loads(&self) -> Vec<MockLoad> {
        self.loads.borrow().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.borrow().len()
    }

    pub fn last_load(&self) -> Option<MockLoad> {
        self.loads.borrow().last().cloned()
    }

    /// Most recent load for `target`.
    pub fn load_for(&self, target: &str) -> Option<MockLoad> {
        let target = url(target);
        self.loads
            .borrow()
            .iter()
            .rev()
            .find(|load| load.url() == &target)
            .cloned()
    }
}

impl Transport for MockTransport {
    fn start(&self, request: &ResourceRequest, sink: LoaderSink) -> Box<dyn TransportHandle> {
        let state = Rc::new(MockLoadState::default());
        self.loads.borrow_mut().push(MockLoad {
            request: request.clone(),
            sink,
            state: state.clone(),
        });
        Box::new(MockHandle { state })
    }
}

/// One observer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Redirect(String),
    Response(u16),
    Data(usize),
    Finished,
    FontShortLimit,
    FontLongLimit,
}

type Hook = Rc<dyn Fn(&Resource)>;

/// Observer that records its callbacks in order.
pub struct RecordingClient {
    name: String,
    events: RefCell<Vec<ClientEvent>>,
    on_finished: RefCell<Option<Hook>>,
    on_data: RefCell<Option<Hook>>,
}

impl RecordingClient {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            events: RefCell::new(Vec::new()),
            on_finished: RefCell::new(None),
            on_data: RefCell::new(None),
        })
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.borrow().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e == ClientEvent::Finished)
            .count()
    }

    /// Run `hook` after every `notify_finished`.
    pub fn set_on_finished(&self, hook: impl Fn(&Resource) + 'static) {
        *self.on_finished.borrow_mut() = Some(Rc::new(hook));
    }

    /// Run `hook` after every `data_received`.
    pub fn set_on_data(&self, hook: impl Fn(&Resource) + 'static) {
        *self.on_data.borrow_mut() = Some(Rc::new(hook));
    }

    fn record(&self, event: ClientEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl ResourceClient for RecordingClient {
    fn debug_name(&self) -> &str {
        &self.name
    }

    fn notify_finished(&self, resource: &Resource) {
        self.record(ClientEvent::Finished);
        let hook = self.on_finished.borrow().clone();
        if let Some(hook) = hook {
            hook(resource);
        }
    }

    fn redirect_received(
        &self,
        _resource: &Resource,
        request: &ResourceRequest,
        _redirect_response: &ResourceResponse,
    ) {
        self.record(ClientEvent::Redirect(request.url().to_string()));
    }

    fn response_received(&self, _resource: &Resource, response: &ResourceResponse) {
        self.record(ClientEvent::Response(response.status().as_u16()));
    }

    fn data_received(&self, resource: &Resource, data: &[u8]) {
        self.record(ClientEvent::Data(data.len()));
        let hook = self.on_data.borrow().clone();
        if let Some(hook) = hook {
            hook(resource);
        }
    }

    fn font_load_short_limit_exceeded(&self, _resource: &Resource) {
        self.record(ClientEvent::FontShortLimit);
    }

    fn font_load_long_limit_exceeded(&self, _resource: &Resource) {
        self.record(ClientEvent::FontLongLimit);
    }
}

/// Upcast for APIs taking `Rc<dyn ResourceClient>`.
pub fn as_client(client: &Rc<RecordingClient>) -> Rc<dyn ResourceClient> {
    client.clone()
}

/// Clock, scheduler, cache, mock transport and context wired to a fetcher.
pub struct TestEnv {
    pub clock: Rc<ManualClock>,
    pub scheduler: Scheduler,
    pub cache: MemoryCache,
    pub transport: Rc<MockTransport>,
    pub context: Rc<DefaultFetchContext>,
    pub fetcher: ResourceFetcher,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_cache_config(cache_config: CacheConfig) -> Self {
        Self::with_config(FetcherConfig::builder().with_cache_config(cache_config).build())
    }

    pub fn with_config(config: FetcherConfig) -> Self {
        let clock = test_clock();
        let scheduler = Scheduler::new(clock.clone());
        let cache = MemoryCache::new(config.cache_config.clone(), scheduler.clone());
        let transport = MockTransport::new();
        let context = Rc::new(DefaultFetchContext::new());
        let fetcher = ResourceFetcher::new(config, context.clone(), cache.clone(), transport.clone());
        Self {
            clock,
            scheduler,
            cache,
            transport,
            context,
            fetcher,
        }
    }

    /// Drain transport events and scheduler tasks.
    pub fn run(&self) -> usize {
        self.fetcher.run_until_idle()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.scheduler.now()
    }

    /// Resource reporting to this environment's cache and scheduler, not
    /// cached and not loading.
    pub fn new_resource(&self, factory: &dyn ResourceFactory, target: &str) -> Resource {
        Resource::new(
            next_resource_id(),
            factory.resource_type(),
            ResourceRequest::new(url(target)),
            Default::default(),
            None,
            None,
            factory.create_payload(),
            ResourceEnv {
                cache: self.cache.downgrade(),
                scheduler: self.scheduler.clone(),
                callback: ResourceCallback::new(self.scheduler.clone()),
            },
        )
    }
}
