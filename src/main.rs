//! Vehicle-Crawl main entry point
//!
//! This is the command-line interface for the new-car listing crawler.

use anyhow::Context;
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vehicle_crawl::browser::{Browser, HttpBrowser};
use vehicle_crawl::config::{compute_config_hash, load_config_with_overrides, Config};
use vehicle_crawl::crawler::{CancelToken, Orchestrator};
use vehicle_crawl::output::{print_summary, write_markdown_report};
use vehicle_crawl::storage::{open_store, SnapshotStore, SqliteStore};

/// Vehicle-Crawl: a resumable new-car listing crawler
///
/// Settings are read from the environment and an optional `.env` file
/// (STORE_URI, STORE_DB, BASE_URL, MAX_PAGES, CONCURRENCY, ...). Flags below
/// override the matching variables.
#[derive(Parser, Debug)]
#[command(name = "vehicle-crawl")]
#[command(version)]
#[command(about = "Crawls new-car listings into a document store", long_about = None)]
struct Cli {
    /// Load settings from this env file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Last listing page to visit (0 for no limit)
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Maximum number of detail pages open at once
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Do not re-fetch detail pages that are already stored
    #[arg(long)]
    skip_existing: bool,

    /// Write a Markdown report of each run to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Validate configuration and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show how many records the store holds and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    /// Flags that override environment settings, keyed by variable name
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut overrides = HashMap::new();
        if let Some(max_pages) = self.max_pages {
            overrides.insert("MAX_PAGES", max_pages.to_string());
        }
        if let Some(concurrency) = self.concurrency {
            overrides.insert("CONCURRENCY", concurrency.to_string());
        }
        if self.skip_existing {
            overrides.insert("SKIP_EXISTING", "true".to_string());
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    let config = match load_config_with_overrides(cli.env_file.as_deref(), &cli.overrides()) {
        Ok(config) => {
            tracing::info!(
                "Configuration loaded successfully (hash: {})",
                compute_config_hash(&config)
            );
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context("invalid configuration");
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let store = open_store(&config.store)
        .with_context(|| format!("failed to open store {}", config.store.connection_uri))?;

    if cli.stats {
        handle_stats(&config, &store).await
    } else {
        handle_crawl(config, store, cli.report.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("vehicle_crawl=info,warn"),
            1 => EnvFilter::new("vehicle_crawl=debug,info"),
            2 => EnvFilter::new("vehicle_crawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Vehicle-Crawl Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  User agent: {}", config.site.user_agent);

    println!("\nCrawler:");
    match config.crawler.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unbounded"),
    }
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Skip existing: {}", config.crawler.skip_existing);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!("  Settle window: {}ms", config.crawler.settle_ms);
    println!(
        "  Retries: {} (backoff from {}ms)",
        config.crawler.max_retries, config.crawler.retry_backoff_ms
    );
    if let Some(hours) = config.crawler.repeat_interval_hours {
        println!("  Repeat every: {}h", hours);
    }

    println!("\nStore:");
    println!("  URI: {}", config.store.connection_uri);
    println!("  Database: {}", config.store.database_name);
    println!("  Collection: {}", config.store.collection);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows how many records are stored
async fn handle_stats(config: &Config, store: &SqliteStore) -> anyhow::Result<()> {
    let count = store.count().await.context("failed to count records")?;
    println!(
        "{} record(s) in {}/{}",
        count, config.store.database_name, config.store.collection
    );
    Ok(())
}

/// Handles the main crawl operation, once or on a repeat interval
async fn handle_crawl(
    config: Config,
    store: SqliteStore,
    report: Option<&Path>,
) -> anyhow::Result<()> {
    let browser: Arc<dyn Browser> = Arc::new(HttpBrowser::new(
        config.site.user_agent.clone(),
        Duration::from_millis(config.crawler.request_timeout_ms),
    ));
    let store: Arc<dyn SnapshotStore> = Arc::new(store);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, letting open pages finish");
                cancel.cancel();
            }
        });
    }

    loop {
        let orchestrator = Orchestrator::with_cancel(
            &config,
            Arc::clone(&browser),
            Arc::clone(&store),
            cancel.clone(),
        )?;

        match orchestrator.run().await {
            Ok(summary) => {
                print_summary(&summary);
                if let Some(path) = report {
                    write_markdown_report(&summary, path)
                        .with_context(|| format!("failed to write report {}", path.display()))?;
                    tracing::info!("Report written to {}", path.display());
                }
            }
            Err(e) if config.crawler.repeat_interval_hours.is_some() => {
                tracing::error!("Crawl failed, will try again next interval: {}", e);
            }
            Err(e) => {
                tracing::error!("Crawl failed: {}", e);
                return Err(e).context("crawl failed");
            }
        }

        let Some(hours) = config.crawler.repeat_interval_hours else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }

        tracing::info!("Next crawl in {} hour(s)", hours);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(hours.saturating_mul(3600))) => {}
            _ = cancel.cancelled() => break,
        }
    }

    Ok(())
}
