use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{
    CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, PRAGMA,
};
use serde::Serialize;
use url::Url;

use super::cache_control::CacheControl;
use crate::resource::ResourceLoaderOptions;

/// How a request wants the memory cache to be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Follow the HTTP caching headers.
    #[default]
    Default,
    /// Revalidate cached entries before use.
    ValidateCache,
    /// Never reuse a cached entry.
    BypassCache,
    /// Reuse whatever is cached, fresh or not.
    ReturnCacheDataElseLoad,
}

/// Whether stored credentials accompany the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Load priority computed by the embedder. Higher variants load first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceLoadPriority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

/// A single HTTP request as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    url: Url,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    cache_mode: CacheMode,
    priority: ResourceLoadPriority,
    credentials: CredentialsMode,
    /// Fields added by the engine to turn this into a revalidation.
    revalidation_fields: Vec<HeaderName>,
}

impl ResourceRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            cache_mode: CacheMode::Default,
            priority: ResourceLoadPriority::default(),
            credentials: CredentialsMode::default(),
            revalidation_fields: Vec::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
    }

    pub fn clear_header(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    /// Set a header that only exists to revalidate a cached response.
    pub fn set_revalidation_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name.clone(), value);
            if !self.revalidation_fields.contains(&name) {
                self.revalidation_fields.push(name);
            }
        }
    }

    pub fn is_revalidating(&self) -> bool {
        !self.revalidation_fields.is_empty()
    }

    /// Drop the fields added by `set_revalidation_header`.
    pub fn clear_revalidation_headers(&mut self) {
        for name in self.revalidation_fields.drain(..) {
            self.headers.remove(&name);
        }
    }

    pub fn header_str(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn priority(&self) -> ResourceLoadPriority {
        self.priority
    }

    pub fn set_priority(&mut self, priority: ResourceLoadPriority) {
        self.priority = priority;
    }

    pub fn with_priority(mut self, priority: ResourceLoadPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn credentials(&self) -> CredentialsMode {
        self.credentials
    }

    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn allow_stored_credentials(&self) -> bool {
        self.credentials != CredentialsMode::Omit
    }

    /// Cache directives carried by the request's `Cache-Control` and
    /// `Pragma` headers.
    pub fn cache_control(&self) -> CacheControl {
        CacheControl::parse(
            self.header_str(CACHE_CONTROL),
            self.header_str(PRAGMA),
        )
    }

    pub fn cache_control_contains_no_cache(&self) -> bool {
        self.cache_control().no_cache
    }

    pub fn cache_control_contains_no_store(&self) -> bool {
        self.cache_control().no_store
    }

    pub fn has_cache_validator_fields(&self) -> bool {
        self.header_str(IF_MODIFIED_SINCE).is_some_and(|v| !v.is_empty())
            || self.header_str(IF_NONE_MATCH).is_some_and(|v| !v.is_empty())
    }

    /// Conditional requests carry validators the engine did not add itself.
    pub fn is_conditional(&self) -> bool {
        self.has_cache_validator_fields()
            || self.headers.contains_key(reqwest::header::IF_MATCH)
            || self.headers.contains_key(reqwest::header::IF_UNMODIFIED_SINCE)
            || self.headers.contains_key(reqwest::header::IF_RANGE)
    }

    /// Request for the next hop of a redirect. A 303, or a 301/302 answering
    /// a POST, switches to a body-less GET. Revalidation fields never follow
    /// a redirect: the validators belong to the original URL.
    pub fn redirected(&self, location: Url, status: reqwest::StatusCode) -> Self {
        let mut next = self.clone();
        next.url = location;
        next.clear_revalidation_headers();
        let switch_to_get = status == reqwest::StatusCode::SEE_OTHER
            || ((status == reqwest::StatusCode::MOVED_PERMANENTLY
                || status == reqwest::StatusCode::FOUND)
                && self.method == Method::POST);
        if switch_to_get && self.method != Method::HEAD {
            next.method = Method::GET;
            next.body = None;
            next.headers.remove(reqwest::header::CONTENT_TYPE);
            next.headers.remove(reqwest::header::CONTENT_LENGTH);
        }
        next
    }
}

/// A request plus the fetch-level options that travel with it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    resource_request: ResourceRequest,
    options: ResourceLoaderOptions,
    for_preload: bool,
    link_preload: bool,
    charset: Option<String>,
    integrity: Option<String>,
}

impl FetchRequest {
    pub fn new(resource_request: ResourceRequest) -> Self {
        Self {
            resource_request,
            options: ResourceLoaderOptions::default(),
            for_preload: false,
            link_preload: false,
            charset: None,
            integrity: None,
        }
    }

    pub fn from_url(url: Url) -> Self {
        Self::new(ResourceRequest::new(url))
    }

    pub fn url(&self) -> &Url {
        self.resource_request.url()
    }

    pub fn resource_request(&self) -> &ResourceRequest {
        &self.resource_request
    }

    pub fn resource_request_mut(&mut self) -> &mut ResourceRequest {
        &mut self.resource_request
    }

    pub fn options(&self) -> &ResourceLoaderOptions {
        &self.options
    }

    pub fn with_options(mut self, options: ResourceLoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn for_preload(&self) -> bool {
        self.for_preload
    }

    pub fn with_for_preload(mut self, for_preload: bool) -> Self {
        self.for_preload = for_preload;
        self
    }

    /// `<link rel=preload>` style preloads. Implies `for_preload`.
    pub fn is_link_preload(&self) -> bool {
        self.link_preload
    }

    pub fn with_link_preload(mut self, link_preload: bool) -> Self {
        self.link_preload = link_preload;
        if link_preload {
            self.for_preload = true;
        }
        self
    }

    /// Charset hint used when neither a BOM nor the response names one.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Subresource integrity metadata, e.g. `sha384-...`.
    pub fn integrity(&self) -> Option<&str> {
        self.integrity.as_deref()
    }

    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }

    pub fn priority(&self) -> ResourceLoadPriority {
        self.resource_request.priority()
    }

    pub fn with_priority(mut self, priority: ResourceLoadPriority) -> Self {
        self.resource_request.set_priority(priority);
        self
    }
}
