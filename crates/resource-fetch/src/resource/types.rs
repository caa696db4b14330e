use serde::Serialize;

/// Kind of artifact a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    MainResource,
    Image,
    StyleSheet,
    Script,
    Font,
    Raw,
    SvgDocument,
    XslStyleSheet,
    LinkPrefetch,
    TextTrack,
    ImportResource,
    Media,
    Manifest,
}

impl ResourceType {
    /// Types that get "cache hit" notifications synchronously on attach.
    pub fn needs_synchronous_cache_hit(self) -> bool {
        matches!(
            self,
            ResourceType::Image | ResourceType::StyleSheet | ResourceType::Script | ResourceType::Font
        )
    }

    /// Types served to raw observers: redirect, response and data callbacks
    /// with no decoded payload.
    pub fn is_raw_family(self) -> bool {
        matches!(
            self,
            ResourceType::MainResource
                | ResourceType::Raw
                | ResourceType::LinkPrefetch
                | ResourceType::TextTrack
                | ResourceType::ImportResource
                | ResourceType::Media
                | ResourceType::Manifest
        )
    }

    /// Whether a load of this type delays the context's load event.
    pub fn is_load_event_blocking(self) -> bool {
        !matches!(
            self,
            ResourceType::LinkPrefetch
                | ResourceType::TextTrack
                | ResourceType::Media
                | ResourceType::Manifest
        )
    }

    /// HTTP error statuses are delivered as ordinary responses.
    pub fn ignores_http_status_errors(self) -> bool {
        self.is_raw_family()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::MainResource => "main",
            ResourceType::Image => "image",
            ResourceType::StyleSheet => "style-sheet",
            ResourceType::Script => "script",
            ResourceType::Font => "font",
            ResourceType::Raw => "raw",
            ResourceType::SvgDocument => "svg-document",
            ResourceType::XslStyleSheet => "xsl-style-sheet",
            ResourceType::LinkPrefetch => "link-prefetch",
            ResourceType::TextTrack => "text-track",
            ResourceType::ImportResource => "import",
            ResourceType::Media => "media",
            ResourceType::Manifest => "manifest",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a resource. `Cached`, `LoadError` and `DecodeError` are
/// terminal until a revalidation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceStatus {
    NotStarted,
    Pending,
    Cached,
    LoadError,
    DecodeError,
}

/// How a preloaded resource was eventually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreloadResult {
    #[default]
    NotReferenced,
    /// Referenced before the load was handed to the network.
    Referenced,
    ReferencedWhileLoading,
    ReferencedWhileComplete,
}

/// Whether attaching an observer counts as using a preload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadReferencePolicy {
    #[default]
    MarkAsReferenced,
    DontMarkAsReferenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBufferingPolicy {
    #[default]
    BufferData,
    DoNotBufferData,
}

/// Options that travel with a request and stick to the resource it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLoaderOptions {
    pub data_buffering_policy: DataBufferingPolicy,
    /// Initiator name used in logs.
    pub initiator: String,
}

impl Default for ResourceLoaderOptions {
    fn default() -> Self {
        Self {
            data_buffering_policy: DataBufferingPolicy::BufferData,
            initiator: "other".to_string(),
        }
    }
}

impl ResourceLoaderOptions {
    pub fn with_data_buffering_policy(mut self, policy: DataBufferingPolicy) -> Self {
        self.data_buffering_policy = policy;
        self
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = initiator.into();
        self
    }

    /// Whether a resource created with `other` can serve a request carrying
    /// these options.
    pub fn can_reuse_request(&self, other: &ResourceLoaderOptions) -> bool {
        self.data_buffering_policy == other.data_buffering_policy
    }
}

/// Outcome of the subresource integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityDisposition {
    #[default]
    NotChecked,
    Passed,
    Failed,
}
