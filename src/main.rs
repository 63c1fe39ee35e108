//! docsieve: crawl, quality-gate and persist web and PDF articles

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsieve::{
    config::{Config, LogFormat, LoggingConfig, StoreBackend},
    embedding::HttpBackend,
    llm::OpenAiCompatClient,
    scraping::{ChromiumBackend, ClearanceWaiter, Deduplicator, FetchEngine, Orchestrator, RunRequest, UrlGovernor},
    store::{DestinationTable, MemoryStore, MilvusStore, VectorStore},
    types::CandidateUrl,
};
use futures::StreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "docsieve.toml";

#[derive(Parser)]
#[command(name = "docsieve")]
#[command(about = "Crawl, quality-gate and persist web and PDF articles into a vector store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over URLs and stream JSON-line results
    Run {
        /// User query the articles are judged against
        #[arg(short, long)]
        query: String,

        /// Scenario hint; skips URLs already stored for it
        #[arg(short, long)]
        scenario: Option<String>,

        /// Candidate URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Seconds to wait for in-flight work on Ctrl-C and at exit
        #[arg(long, default_value = "30")]
        grace_secs: u64,
    },

    /// Show how URL governance treats a URL
    CheckUrl {
        url: String,

        /// Restrict to hosts ending with this domain
        #[arg(long)]
        base_domain: Option<String>,
    },

    /// Print the URLs not yet stored for a scenario
    FilterExisting {
        #[arg(short, long)]
        scenario: String,

        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Write a default configuration file
    Init {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose)?;
        return init_config(path, *force);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Run {
            query,
            scenario,
            urls,
            grace_secs,
        } => run_pipeline(config, query, scenario, urls, Duration::from_secs(grace_secs)).await,
        Commands::CheckUrl { url, base_domain } => check_url(&config, &url, base_domain.as_deref()),
        Commands::FilterExisting { scenario, urls } => filter_existing(config, &scenario, urls).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::load(Path::new(DEFAULT_CONFIG_FILE)),
        None => Config::from_env(),
    }
}

fn init_logging(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = config.level.raised_by(verbose);
    let directive = format!("docsieve={}", level);
    let filter = if verbose > 0 {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Milvus => {
            let embedder = HttpBackend::new(config.embedding.clone()).context("embedding backend")?;
            Arc::new(MilvusStore::new(&config.store, Arc::new(embedder)).context("Milvus store")?)
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store; nothing will outlive this process");
            Arc::new(MemoryStore::new(config.embedding.dimensions))
        }
    };
    Ok(store)
}

async fn run_pipeline(
    config: Config,
    query: String,
    scenario: Option<String>,
    urls: Vec<String>,
    grace: Duration,
) -> Result<()> {
    let store = build_store(&config)?;
    let llm = Arc::new(OpenAiCompatClient::new(config.llm.clone()).context("reasoning client")?);

    let renderer = Arc::new(ChromiumBackend::new(
        config.crawler.browser.clone(),
        config.crawler.proxy.clone(),
        config.crawler.fetch_timeout(),
        Arc::new(ClearanceWaiter::default()),
    ));
    let fetcher = FetchEngine::new(&config.crawler, Arc::new(config.filter.clone()), renderer)?;

    let orchestrator = Orchestrator::new(&config, Arc::new(fetcher), llm, store);

    let mut request = RunRequest::new(urls, query);
    request.scenario = scenario;
    let mut stream = orchestrator.stream_request(request).await;

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(result) => println!("{}", serde_json::to_string(&result)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling run");
                for result in stream.cancel(grace).await {
                    println!("{}", serde_json::to_string(&result)?);
                }
                break;
            }
        }
    }
    drop(stream);

    if !orchestrator.shutdown(grace).await {
        warn!("some articles were not persisted before shutdown");
    }
    let stats = orchestrator.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        failed = stats.failed,
        cancelled = stats.cancelled,
        "run complete"
    );
    Ok(())
}

fn check_url(config: &Config, url: &str, base_domain: Option<&str>) -> Result<()> {
    let base_domain = base_domain.or(config.crawler.base_domain.as_deref());
    let governor = UrlGovernor::new(&config.filter, None);
    let valid = governor.is_valid(url, base_domain);
    let candidate = CandidateUrl::parse(url);

    let report = json!({
        "url": url,
        "valid": valid,
        "is_pdf": candidate.as_ref().is_some_and(CandidateUrl::is_pdf),
        "dedup_key": candidate.as_ref().map(CandidateUrl::dedup_key),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn filter_existing(config: Config, scenario: &str, urls: Vec<String>) -> Result<()> {
    let destinations = Arc::new(DestinationTable::new(&config.store.destinations));
    if destinations.resolve(Some(scenario)).is_none() {
        anyhow::bail!("Unknown scenario '{}'", scenario);
    }

    let store = build_store(&config)?;
    let dedup = Deduplicator::new(store, destinations, config.store.dedup_batch_size);
    let keys: Vec<String> = urls.iter().map(|u| docsieve::scraping::normalize_url(u)).collect();
    for url in dedup.filter_existing(&keys, Some(scenario)).await {
        println!("{}", url);
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = format!("# docsieve configuration\n\n{}", Config::default().to_toml_string()?);
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}
