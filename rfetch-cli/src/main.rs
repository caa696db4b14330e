use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::Parser;
use mimalloc::MiMalloc;
use resource_fetch::variants::FontResource;
use resource_fetch::{
    CacheConfig, DefaultFetchContext, FetcherConfig, ReqwestTransport, Resource, ResourceClient,
    ResourceFetcher, SystemClock, TransportConfig,
};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod error;
mod report;
mod utils;

use cli::{CliArgs, ResourceKind};
use error::AppError;
use report::{FetchOutcome, LoggingClient, Report, decision};
use utils::{parse_headers, parse_size, parse_time};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Setup logging; RUST_LOG overrides the verbosity flag
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    // The engine and the reqwest transport run on local tasks
    let local = tokio::task::LocalSet::new();
    let report = local.run_until(run(&args)).await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        report.print_text();
    }
    Ok(())
}

fn transport_config(args: &CliArgs) -> TransportConfig {
    let mut builder = TransportConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_headers(parse_headers(&args.headers))
        .with_max_redirects(args.max_redirects);
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent);
    }
    if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        builder = builder.with_system_proxy(false);
    } else if let Some(proxy) = &args.proxy {
        info!(proxy = %proxy, "Using explicit proxy configuration");
        builder = builder.with_proxy(proxy);
    }
    builder.build()
}

fn fetcher_config(args: &CliArgs) -> Result<FetcherConfig, AppError> {
    let capacity = usize::try_from(parse_size(&args.cache_size)?)
        .map_err(|_| AppError::InvalidInput(format!("Cache size too large: {}", args.cache_size)))?;
    let cache_config = CacheConfig::builder().with_capacity(capacity).build();
    let mut builder = FetcherConfig::builder()
        .with_cache_config(cache_config)
        .with_max_redirects(args.max_redirects);
    if let Some(partition) = &args.partition {
        builder = builder.with_cache_identifier(partition);
    }
    Ok(builder.build())
}

struct Pending {
    decision: &'static str,
    resource: Resource,
    client: Rc<dyn ResourceClient>,
}

async fn run(args: &CliArgs) -> Result<Report, AppError> {
    if args.repeat == 0 {
        return Err(AppError::InvalidInput("--repeat must be at least 1".to_string()));
    }
    let interval = parse_time(&args.interval)?;
    let urls = args
        .urls
        .iter()
        .map(|input| ResourceFetcher::parse_url(input))
        .collect::<Result<Vec<_>, _>>()?;

    let transport = Rc::new(ReqwestTransport::new(&transport_config(args))?);
    let context = Rc::new(DefaultFetchContext::new());
    context.set_cache_mode(args.cache_mode.into());
    for host in &args.blocked_hosts {
        context.block_host(host.as_str());
    }
    let fetcher = ResourceFetcher::with_clock(
        fetcher_config(args)?,
        context.clone(),
        transport,
        Rc::new(SystemClock),
    );
    let factory = args.resource_type.factory();

    info!(
        urls = urls.len(),
        rounds = args.repeat,
        resource_type = %factory.resource_type(),
        "Starting fetch"
    );
    let started = Instant::now();
    let mut outcomes = Vec::new();

    for round in 1..=args.repeat {
        let mut pending = Vec::new();
        for url in &urls {
            let before = fetcher.fetch_stats();
            let client: Rc<dyn ResourceClient> = Rc::new(LoggingClient::new(url.as_str()));
            let request = fetcher.new_request(url.clone());
            match fetcher.request_resource(request, factory.as_ref(), Some(client.clone())) {
                Ok(resource) => {
                    let decision = decision(&before, &fetcher.fetch_stats());
                    debug!(round, url = %url, decision, "Requested");
                    if args.resource_type == ResourceKind::Font
                        && let Some(font) = FontResource::from_resource(resource.clone())
                    {
                        font.begin_load_if_needed(&fetcher);
                    }
                    pending.push(Pending {
                        decision,
                        resource,
                        client,
                    });
                }
                Err(e) => {
                    warn!(round, url = %url, error = %e, "Request refused");
                    outcomes.push(FetchOutcome::refused(round, url.as_str(), &e));
                }
            }
        }

        fetcher.run_until_complete().await;
        for entry in pending {
            outcomes.push(FetchOutcome::from_resource(round, entry.decision, &entry.resource));
            entry.resource.remove_client(&entry.client);
        }

        // Later rounds see a finished page load, so freshness decides reuse.
        context.set_load_complete(true);
        if round < args.repeat && !interval.is_zero() {
            debug!(?interval, "Waiting before next round");
            tokio::time::sleep(interval).await;
        }
    }

    Ok(Report {
        outcomes,
        fetch_stats: fetcher.fetch_stats(),
        preload_stats: fetcher.preload_stats(),
        cache_stats: fetcher.memory_cache().stats(),
        elapsed: started.elapsed(),
    })
}
