use reqwest::StatusCode;
use std::sync::Arc;
use url::Url;

/// Terminal failure of a resource load.
///
/// Errors are fanned out to every observer of a resource, so the type is cheap
/// to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    #[error("Network error loading {url}: {reason}")]
    Network { url: Url, reason: String },

    #[error("Load of {url} was cancelled")]
    Cancelled { url: Url },

    #[error("Access to {url} was blocked: {reason}")]
    AccessCheck { url: Url, reason: String },

    #[error("Server returned status code {status} for {url}")]
    HttpStatus { url: Url, status: StatusCode },

    #[error("Failed to decode {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: DecodeError,
    },

    #[error("Load of {url} timed out")]
    Timeout { url: Url },
}

impl ResourceError {
    pub fn cancelled(url: &Url) -> Self {
        Self::Cancelled { url: url.clone() }
    }

    pub fn network(url: &Url, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.clone(),
            reason: reason.into(),
        }
    }

    /// Cancellations always evict the resource from the memory cache, even
    /// when it was preloaded.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_access_check(&self) -> bool {
        matches!(self, Self::AccessCheck { .. })
    }

    pub fn url(&self) -> &Url {
        match self {
            Self::Network { url, .. }
            | Self::Cancelled { url }
            | Self::AccessCheck { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::Decode { url, .. }
            | Self::Timeout { url } => url,
        }
    }
}

/// Failure reported by a payload decoder.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("No decoder registered for {0}")]
    MissingDecoder(&'static str),

    #[error("Decoder failure: {0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

/// Refusal scoped to a single observer category.
///
/// Returned by typed accessors (style sheet text, script source, ...) so that
/// a MIME or integrity problem is seen only by observers that want the typed
/// payload. The resource itself keeps its status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefusalReason {
    #[error("Resource has not finished loading")]
    NotLoaded,

    #[error("Resource failed to load")]
    LoadFailed,

    #[error("Refused MIME type '{0}'")]
    MimeType(String),

    #[error("Integrity metadata did not match the response body")]
    Integrity,

    #[error("Payload could not be decoded")]
    Decode,
}

/// Reasons `ResourceFetcher::request_resource` can refuse to hand out a
/// resource.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Loading context has been detached")]
    Detached,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request for {url} was blocked: {reason}")]
    Blocked { url: Url, reason: String },

    #[error("Resource for {url} has type {actual:?}, expected {expected:?}")]
    TypeMismatch {
        url: Url,
        expected: crate::resource::ResourceType,
        actual: crate::resource::ResourceType,
    },

    #[error("Load for {0} could not be started")]
    LoadNotStarted(Url),
}

/// Failures inside the reqwest transport before they are mapped onto
/// `ResourceError`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Too many redirects ({0})")]
    TooManyRedirects(usize),

    #[error("Invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl TransportError {
    pub fn into_resource_error(self, url: &Url) -> ResourceError {
        match self {
            TransportError::Http(e) if e.is_timeout() => ResourceError::Timeout { url: url.clone() },
            other => ResourceError::network(url, other.to_string()),
        }
    }
}
