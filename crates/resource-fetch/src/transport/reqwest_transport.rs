//! # Reqwest Transport
//!
//! [`Transport`] backed by a `reqwest::Client`. Each load runs as a local
//! task, so loads must be started from inside a `tokio::task::LocalSet`.
//! Redirects are followed by hand so the engine sees every hop.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::{Client, StatusCode};
use rustls::ClientConfig;
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{LoaderSink, Transport, TransportHandle};
use crate::error::TransportError;
use crate::http::{ResourceRequest, ResourceResponse};

const DEFAULT_USER_AGENT: &str = concat!("rfetch/", env!("CARGO_PKG_VERSION"));

/// Configurable options for the reqwest transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for a single request, zero for none
    pub timeout: Duration,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
    /// Headers sent with every request
    pub headers: HeaderMap,
    /// Redirect hops followed before the load fails
    pub max_redirects: usize,
    /// Explicit proxy URL; overrides the system proxy
    pub proxy: Option<String>,
    pub use_system_proxy: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
            max_redirects: 20,
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }
}

/// Builder for [`TransportConfig`]
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request. Invalid names or values are
    /// ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self.config.use_system_proxy = false;
        self
    }

    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, TransportError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(6)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::none());

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }
    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }
    if !config.pool_idle_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.pool_idle_timeout);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| TransportError::Unsupported(format!("Invalid proxy URL: {e}")))?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_url, "Using explicitly configured proxy");
    } else if !config.use_system_proxy {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    Ok(client_builder.build()?)
}

/// Network transport built on reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    max_redirects: usize,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: create_client(config)?,
            max_redirects: config.max_redirects,
        })
    }

    pub fn with_client(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }
}

struct ReqwestHandle {
    token: CancellationToken,
}

impl TransportHandle for ReqwestHandle {
    fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for ReqwestHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Transport for ReqwestTransport {
    fn start(&self, request: &ResourceRequest, sink: LoaderSink) -> Box<dyn TransportHandle> {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let client = self.client.clone();
        let max_redirects = self.max_redirects;
        let request = request.clone();

        tokio::task::spawn_local(async move {
            let url = request.url().clone();
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!(url = %url, loader = sink.loader_id(), "Load cancelled");
                }
                result = run_load(&client, request, max_redirects, &sink) => {
                    if let Err(e) = result {
                        debug!(url = %url, error = %e, "Transport error");
                        sink.fail(e.into_resource_error(&url));
                    }
                }
            }
        });

        Box::new(ReqwestHandle { token })
    }
}

fn is_followable_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn run_load(
    client: &Client,
    mut request: ResourceRequest,
    max_redirects: usize,
    sink: &LoaderSink,
) -> Result<(), TransportError> {
    let mut redirects = 0;
    loop {
        let scheme = request.url().scheme();
        if scheme != "http" && scheme != "https" {
            return Err(TransportError::Unsupported(format!("scheme '{scheme}'")));
        }

        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();

        if is_followable_redirect(status)
            && let Some(location) = headers.get(LOCATION)
        {
            redirects += 1;
            if redirects > max_redirects {
                return Err(TransportError::TooManyRedirects(max_redirects));
            }
            let location = location
                .to_str()
                .map_err(|e| TransportError::InvalidRedirect(e.to_string()))?;
            let next_url = url
                .join(location)
                .map_err(|e| TransportError::InvalidRedirect(format!("{location}: {e}")))?;
            let next = request.redirected(next_url, status);
            sink.redirect(next.clone(), ResourceResponse::new(url, status, headers));
            request = next;
            continue;
        }

        sink.response(ResourceResponse::new(url, status, headers));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            sink.data(chunk?);
        }
        sink.finish();
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = TransportConfigBuilder::new().build();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 20);
        assert!(config.use_system_proxy);
        assert!(config.user_agent.starts_with("rfetch/"));
    }

    #[test]
    fn test_builder_customization() {
        let config = TransportConfig::builder()
            .with_timeout(Duration::from_secs(5))
            .with_max_redirects(3)
            .with_user_agent("Custom/1.0")
            .with_header("X-Custom-Header", "CustomValue")
            .with_header("bad header", "ignored")
            .with_proxy("http://proxy.example.com:8080")
            .with_system_proxy(true)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.user_agent, "Custom/1.0");
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers.get("x-custom-header").unwrap(), "CustomValue");
        // An explicit proxy wins over the system proxy.
        assert!(!config.use_system_proxy);
    }

    #[test]
    fn test_followable_redirects() {
        assert!(is_followable_redirect(StatusCode::FOUND));
        assert!(is_followable_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_followable_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_followable_redirect(StatusCode::MULTIPLE_CHOICES));
    }
}
