//! vntm-crawler main entry point
//!
//! This is the command-line interface for the trademark registry crawler.

use anyhow::{bail, Context};
use chrono::{Datelike, Utc};
use clap::Parser;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vntm_crawler::config::{load_config_with_hash, Config};
use vntm_crawler::crawler::{CrawlSequencer, ReqwestTransport, RequestExecutor};
use vntm_crawler::output::{load_statistics, print_statistics, summarize_refresh, summarize_years};
use vntm_crawler::proxy::{ProxyPool, ProxyRecord, ProxyRegistry};
use vntm_crawler::session::{LayeredCookieStore, SessionCredential, StaticCookieStore};
use vntm_crawler::storage::{open_storage, Persistence, RunStatus, SharedStorage};
use vntm_crawler::CrawlError;

/// vntm-crawler: walks the trademark registry by application code
///
/// Candidate codes are validated against the registry's suggestion endpoint,
/// fetched from the search portal and stored in SQLite. Requests rotate
/// through a proxy pool under a per-minute rate limit.
#[derive(Parser, Debug)]
#[command(name = "vntm-crawler")]
#[command(version)]
#[command(about = "A resilient crawler for the trademark registry", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl a single year
    #[arg(long, conflicts_with_all = ["from_year", "to_year"])]
    year: Option<i32>,

    /// First year to crawl (defaults to start-year)
    #[arg(long)]
    from_year: Option<i32>,

    /// Last year to crawl (defaults to end-year, then the current year)
    #[arg(long)]
    to_year: Option<i32>,

    /// Continue every year after the highest sequence already stored
    #[arg(long)]
    resume: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "refresh_status"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "refresh_status"])]
    stats: bool,

    /// Re-fetch every stored record with this status and exit
    #[arg(long, value_name = "STATUS")]
    refresh_status: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let years = year_range(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &years, cli.resume);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash, years, cli.resume, cli.refresh_status).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("vntm_crawler=info,warn"),
            1 => EnvFilter::new("vntm_crawler=debug,info"),
            2 => EnvFilter::new("vntm_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Resolves the years to crawl from the flags and the configuration
fn year_range(cli: &Cli, config: &Config) -> anyhow::Result<RangeInclusive<i32>> {
    if let Some(year) = cli.year {
        return Ok(year..=year);
    }

    let from = cli.from_year.unwrap_or(config.crawler.start_year);
    let to = cli
        .to_year
        .or(config.crawler.end_year)
        .unwrap_or_else(|| Utc::now().year());

    if to < from {
        bail!("year range {}..={} is empty", from, to);
    }
    Ok(from..=to)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, years: &RangeInclusive<i32>, resume: bool) {
    println!("=== vntm-crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Code prefix: {}", config.crawler.code_prefix);
    println!("  Years: {} to {}", years.start(), years.end());
    println!("  Start sequence: {}", config.crawler.start_sequence);
    println!("  Resume: {}", resume);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Max requests per minute: {}",
        config.crawler.max_requests_per_minute
    );
    println!(
        "  Retries: {} (backoff base {}s)",
        config.crawler.max_retries, config.crawler.backoff_base_secs
    );
    println!(
        "  Consecutive misses before a year ends: {}",
        config.crawler.max_consecutive_misses
    );

    println!("\nPortal:");
    println!("  Validate: {}", config.portal.validate_url);
    println!("  Fetch: {}", config.portal.fetch_url);
    println!(
        "  Detail: {}",
        config.portal.detail_url.as_deref().unwrap_or("(not configured)")
    );

    println!("\nProxies:");
    println!("  Static entries: {}", config.proxy.list.len());
    for entry in &config.proxy.list {
        println!("    * {}", entry);
    }
    println!("  Load from database: {}", config.proxy.load_from_database);
    println!(
        "  Max requests per proxy: {}",
        config.proxy.max_requests_per_proxy
    );

    println!("\nSession:");
    match &config.session {
        Some(session) => match session.expires_at {
            Some(expires_at) => println!("  Configured (expires {})", expires_at),
            None => println!("  Configured"),
        },
        None => println!("  Not configured (database cookies only)"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} year(s) of {} codes",
        years.clone().count(),
        config.crawler.code_prefix
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, &config.crawler.code_prefix)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles a crawl or a status refresh, recorded as one run
async fn handle_crawl(
    config: Config,
    config_hash: String,
    years: RangeInclusive<i32>,
    resume: bool,
    refresh_status: Option<String>,
) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    let shared = SharedStorage::new(storage);

    let pool = build_pool(&config, &shared)?;
    if pool.is_empty() {
        bail!("no proxies available: configure [proxy] list or add rows to the proxies table");
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let cookies = LayeredCookieStore::new(
        shared.clone(),
        StaticCookieStore::new(config.session.as_ref().map(SessionCredential::from)),
    );
    let executor = RequestExecutor::from_config(
        &config,
        ReqwestTransport::from_config(&config),
        pool,
        Box::new(cookies),
        cancel,
    );
    let mut sequencer = CrawlSequencer::new(executor, Box::new(shared.clone()), &config);

    let run_id = shared.lock().create_run(&config_hash)?;
    tracing::info!("Started run #{}", run_id);

    let result = match &refresh_status {
        Some(status) => sequencer
            .refresh_status(status)
            .await
            .map(|report| summarize_refresh(status, &report)),
        None => {
            tracing::info!(
                "Crawling {} codes for years {} to {}{}",
                config.crawler.code_prefix,
                years.start(),
                years.end(),
                if resume { " (resuming)" } else { "" }
            );
            sequencer
                .crawl_years(years, resume)
                .await
                .map(|reports| summarize_years(&reports))
        }
    };

    let status = match &result {
        Ok(_) => RunStatus::Completed,
        Err(CrawlError::Cancelled) => RunStatus::Interrupted,
        Err(_) => RunStatus::Failed,
    };
    if let Err(e) = shared.lock().finish_run(run_id, status) {
        tracing::warn!("Failed to finish run #{}: {}", run_id, e);
    }

    match result {
        Ok(summary) => {
            tracing::info!("{}", summary);
            Ok(())
        }
        Err(CrawlError::Cancelled) => {
            tracing::warn!("Run #{} interrupted, rerun with --resume to continue", run_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run #{} failed: {}", run_id, e);
            Err(e.into())
        }
    }
}

/// Builds the proxy pool from the static list and the proxy table
fn build_pool(config: &Config, shared: &SharedStorage) -> anyhow::Result<ProxyPool> {
    let static_list = config
        .proxy
        .list
        .iter()
        .map(|entry| ProxyRecord::parse_entry(entry, &config.proxy.username, &config.proxy.password))
        .collect::<Result<Vec<_>, _>>()?;

    let registry: Option<&dyn ProxyRegistry> = if config.proxy.load_from_database {
        Some(shared)
    } else {
        None
    };

    let mut pool = ProxyPool::new(config.proxy.max_requests_per_proxy)
        .with_registry(Box::new(shared.clone()));
    pool.load(static_list, registry)?;
    Ok(pool)
}

/// Cancels `cancel` on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current request");
            cancel.cancel();
        }
    });
}
