use clap::{Parser, ValueEnum};
use resource_fetch::CacheMode;
use resource_fetch::variants::{
    FontResourceFactory, ImageResourceFactory, RawResourceFactory, ResourceFactory,
    ScriptResourceFactory, StyleSheetResourceFactory,
};

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Fetch URLs through the resource loading and caching engine",
    long_about = "Fetches one or more URLs through the resource-fetch engine using the reqwest\n\
                  transport, and reports how each request was served: loaded, reused from the\n\
                  memory cache, revalidated or reloaded.\n\
                  \n\
                  Use --repeat to request the same URLs several times and observe HTTP\n\
                  freshness and revalidation at work."
)]
pub struct CliArgs {
    /// URL(s) to fetch
    #[arg(required = true, help = "URL(s) to fetch, including data: URLs")]
    pub urls: Vec<String>,

    /// Resource type requested for every URL
    #[arg(
        short = 't',
        long = "type",
        value_enum,
        default_value = "raw",
        help = "Resource type to request"
    )]
    pub resource_type: ResourceKind,

    /// Number of rounds over the URL list
    #[arg(
        short = 'r',
        long,
        default_value = "1",
        help = "Request every URL this many times, one round after another"
    )]
    pub repeat: usize,

    /// Pause between rounds with optional unit (s, m, h)
    #[arg(
        long,
        default_value = "0",
        help = "Pause between rounds with optional unit (s, m, h). Examples: \"5s\", \"1.5m\""
    )]
    pub interval: String,

    /// Memory cache capacity with optional unit (B, KB, MB, GB)
    #[arg(
        long,
        default_value = "8MB",
        help = "Memory cache capacity with optional unit (B, KB, MB, GB). Examples: \"8MB\", \"512KB\""
    )]
    pub cache_size: String,

    /// Cache mode applied to every request
    #[arg(long, value_enum, default_value = "default", help = "Cache mode for requests")]
    pub cache_mode: CacheModeArg,

    /// Memory cache partition
    #[arg(long, help = "Memory cache partition for this loading context")]
    pub partition: Option<String>,

    /// Hosts whose requests are refused
    #[arg(
        long = "block",
        value_name = "HOST",
        help = "Refuse requests and redirects to this host (can be used multiple times)"
    )]
    pub blocked_hosts: Vec<String>,

    /// Maximum redirect hops
    #[arg(long, default_value = "20", help = "Redirect hops followed before a load fails")]
    pub max_redirects: usize,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for HTTP requests (0 for none)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// User agent override
    #[arg(long, help = "User-Agent header sent with every request")]
    pub user_agent: Option<String>,

    /// Custom HTTP headers
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(long, help = "Proxy server URL (e.g., \"http://proxy.example.com:8080\")")]
    pub proxy: Option<String>,

    /// Disable all proxy settings
    #[arg(long, help = "Disable all proxy settings (including system proxy)")]
    pub no_proxy: bool,

    /// Print the report as JSON
    #[arg(long, help = "Print the report as JSON on stdout")]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Raw,
    Script,
    Style,
    Image,
    Font,
}

impl ResourceKind {
    pub fn factory(self) -> Box<dyn ResourceFactory> {
        match self {
            ResourceKind::Raw => Box::new(RawResourceFactory::default()),
            ResourceKind::Script => Box::new(ScriptResourceFactory),
            ResourceKind::Style => Box::new(StyleSheetResourceFactory),
            ResourceKind::Image => Box::new(ImageResourceFactory::default()),
            ResourceKind::Font => Box::new(FontResourceFactory::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheModeArg {
    Default,
    Validate,
    Bypass,
    ReturnCache,
}

impl From<CacheModeArg> for CacheMode {
    fn from(mode: CacheModeArg) -> Self {
        match mode {
            CacheModeArg::Default => CacheMode::Default,
            CacheModeArg::Validate => CacheMode::ValidateCache,
            CacheModeArg::Bypass => CacheMode::BypassCache,
            CacheModeArg::ReturnCache => CacheMode::ReturnCacheDataElseLoad,
        }
    }
}
