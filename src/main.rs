//! Catalog-Sync main entry point
//!
//! This is the command-line interface for the catalog ingestion pipeline.

use anyhow::Context;
use catalog_sync::config::{load_config_with_hash, Config};
use catalog_sync::output::{load_statistics, print_run_summary, print_statistics};
use catalog_sync::storage::{
    open_storage, read_id_dump, reclassify_all, seed_from_snapshot, CatalogStore, ItemKind,
    SqliteStorage,
};
use catalog_sync::sync::{build_http_client, run_sync, ExportLocator};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Sync: a rate-limited catalog ingestion pipeline
///
/// Catalog-Sync keeps a local SQLite catalog in step with a remote record
/// service, classifying release labels and re-encoding poster images while
/// staying inside the service's rate limits.
#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(version = "1.0.0")]
#[command(about = "A rate-limited catalog ingestion pipeline", long_about = None)]
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

    /// Validate config and show what the next run would fetch
    #[arg(long, conflicts_with_all = ["stats", "seed_dump", "fetch_exports", "reclassify"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "seed_dump", "fetch_exports", "reclassify"])]
    stats: bool,

    /// Add IDs from a JSON-lines export (plain or gzipped) that are not yet in the catalog
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats", "fetch_exports", "reclassify"])]
    seed_dump: Option<PathBuf>,

    /// Download the newest published movie and TV exports and seed the backlog from them
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "seed_dump", "reclassify"])]
    fetch_exports: bool,

    /// Item kind of the IDs in --seed-dump
    #[arg(long, default_value = "movie", requires = "seed_dump")]
    kind: ItemKind,

    /// Re-derive classified metadata from stored labels without fetching
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "seed_dump", "fetch_exports"])]
    reclassify: bool,

    /// Maximum number of items to process in this run
    #[arg(long, value_name = "N")]
    limit: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(limit) = cli.limit {
        config.sync.items_per_run = Some(limit);
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(dump) = &cli.seed_dump {
        handle_seed_dump(&config, dump, cli.kind)
    } else if cli.fetch_exports {
        handle_fetch_exports(&config).await
    } else if cli.reclassify {
        handle_reclassify(&config)
    } else {
        handle_sync(config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_sync=info,warn"),
            1 => EnvFilter::new("catalog_sync=debug,info"),
            2 => EnvFilter::new("catalog_sync=trace,debug"),
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

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open {}", config.output.database_path))
}

/// Handles the --dry-run mode: validates config and shows the due backlog
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Sync Dry Run ===\n");

    println!("Remote Service:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Images: {}", config.api.image_base_url);
    println!("  Request language: {}", config.api.language);
    println!(
        "  Display target: {} / {} ({})",
        config.api.target_language, config.api.target_country, config.api.target_script
    );

    println!("\nSync:");
    println!("  Concurrency: {}", config.sync.concurrency);
    println!("  Batch size: {}", config.sync.batch_size);
    println!(
        "  Retries: {} requests, {} downloads",
        config.sync.request_retries, config.sync.download_retries
    );
    println!(
        "  Rate limit: {} calls per {}ms",
        config.rate_limit.max_calls, config.rate_limit.window_ms
    );

    println!("\nAssets:");
    if config.assets.enabled {
        println!("  Temp dir: {}", config.assets.temp_dir);
        println!("  Output dir: {}", config.assets.output_dir);
        println!(
            "  Workers: {} (queue {})",
            config.assets.transform_workers, config.assets.queue_capacity
        );
    } else {
        println!("  Disabled");
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let storage = open_database(config)?;
    let limit = config.sync.items_per_run.map(|n| n as usize);
    let due = storage.next_batch(limit)?;

    println!("\n✓ Configuration is valid");
    println!("✓ Next run would attempt {} items", due.len());
    for item in due.iter().take(10) {
        match item.last_synced_at {
            Some(ts) => println!("  - {} (last synced {})", item.key(), ts),
            None => println!("  - {} (never synced)", item.key()),
        }
    }
    if due.len() > 10 {
        println!("  ... and {} more", due.len() - 10);
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --seed-dump mode: adds unseen IDs from a bulk export
fn handle_seed_dump(config: &Config, dump: &Path, kind: ItemKind) -> anyhow::Result<()> {
    let remote = read_id_dump(dump).with_context(|| format!("Failed to read {}", dump.display()))?;

    let mut storage = open_database(config)?;
    let added = seed_from_snapshot(&mut storage, kind, &remote)?;

    println!("✓ Added {} new {} items to the backlog", added, kind);
    Ok(())
}

/// Handles the --fetch-exports mode: downloads the newest exports and seeds from them
async fn handle_fetch_exports(config: &Config) -> anyhow::Result<()> {
    let client = build_http_client(
        &config.api.user_agent,
        Duration::from_secs(config.exports.download_timeout_secs),
    )?;
    let locator = ExportLocator::new(client, &config.exports);
    let today = chrono::Utc::now().date_naive();

    let mut storage = open_database(config)?;
    for kind in [ItemKind::Movie, ItemKind::Tv] {
        let Some(path) = locator.fetch_latest(kind, today).await? else {
            println!("✗ No {} export available", kind);
            continue;
        };

        let remote =
            read_id_dump(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let added = seed_from_snapshot(&mut storage, kind, &remote)?;
        println!("✓ Added {} new {} items to the backlog", added, kind);
    }

    Ok(())
}

/// Handles the --reclassify mode: re-derives stored metadata
fn handle_reclassify(config: &Config) -> anyhow::Result<()> {
    let mut storage = open_database(config)?;
    let updated = reclassify_all(&mut storage)?;

    println!("✓ Reclassified {} releases", updated);
    Ok(())
}

/// Handles the main sync operation
async fn handle_sync(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Concurrency: {}, batch size: {}, rate limit: {}/{}ms",
        config.sync.concurrency,
        config.sync.batch_size,
        config.rate_limit.max_calls,
        config.rate_limit.window_ms
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight items");
            on_signal.cancel();
        }
    });

    match run_sync(config, config_hash, cancel).await {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            Err(e.into())
        }
    }
}
