//! Live seismic-event ingestion daemon.
//!
//! This is the main entry point for the live ingestion service. It connects
//! to the SeismicPortal standing-order websocket feed, receives event
//! notifications in real-time, and persists them into the SQLite store,
//! keeping both the current state of each event and its full revision
//! history.
//!
//! # Usage
//!
//! ```bash
//! # Run against the public feed
//! quake-ingest --db-path ./data/events.db
//!
//! # Custom feed endpoint and bounded retries
//! quake-ingest \
//!     --db-path ./data/events.db \
//!     --feed-url wss://example.org/standing_order/websocket \
//!     --retry-budget 10
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) for graceful shutdown:
//! 1. Stops receiving new frames from the feed
//! 2. Finishes the in-flight message (its transaction commits or rolls back)
//! 3. Prints a run summary and exits cleanly
//!
//! The rest of the queue is not drained on shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use quake_core::metrics::{init_metrics, start_metrics_server};
use quake_ingest::{EventStore, FeedConfig, Pipeline, PipelineConfig, StoreConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Live seismic-event ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "quake-ingest")]
#[command(about = "Live seismic-event ingestion daemon")]
#[command(version)]
struct Args {
    /// SQLite database path (created on first run; required)
    #[arg(long)]
    db_path: PathBuf,

    /// Websocket URL of the seismic feed
    #[arg(
        long,
        default_value = "wss://www.seismicportal.eu/standing_order/websocket"
    )]
    feed_url: String,

    /// Frame queue capacity (the receiver blocks when full)
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,

    /// Feed connection timeout in seconds
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// Maximum reconnect backoff in seconds
    #[arg(long, default_value = "60")]
    max_backoff: u64,

    /// Consecutive connection failures before giving up (default: retry forever)
    #[arg(long)]
    retry_budget: Option<u32>,

    /// Database busy timeout in seconds
    #[arg(long, default_value = "5")]
    db_timeout: u64,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("quake_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("quake-ingest daemon starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
        gauge!("ingest_running").set(1.0);
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Open the store; a bad path fails fast before any loop starts.
    let store_config = StoreConfig {
        busy_timeout: Duration::from_secs(args.db_timeout),
    };
    let store = EventStore::open(&args.db_path, &store_config)
        .with_context(|| format!("Failed to open event store at {}", args.db_path.display()))?;

    let feed_config = FeedConfig {
        url: args.feed_url.clone(),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        max_backoff: Duration::from_secs(args.max_backoff),
        retry_budget: args.retry_budget,
        ..Default::default()
    };

    tracing::info!("Configuration:");
    tracing::info!("  Database: {}", args.db_path.display());
    tracing::info!("  Feed: {}", args.feed_url);
    tracing::info!("  Queue capacity: {}", args.queue_capacity);
    tracing::info!(
        "  Retry budget: {}",
        args.retry_budget
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );

    let pipeline = Pipeline::new(
        store,
        PipelineConfig {
            queue_capacity: args.queue_capacity,
        },
        Arc::clone(&running),
    );

    tracing::info!("Starting live ingestion...");
    let stats = pipeline.run(feed_config).await?;

    // Mark as stopped
    gauge!("ingest_running").set(0.0);

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Frames received:      {}", stats.frames_received);
    tracing::info!("Feed reconnects:      {}", stats.reconnects);
    tracing::info!("Duplicates dropped:   {}", stats.duplicates);
    tracing::info!("Parse failures:       {}", stats.parse_failures);
    tracing::info!("Events created:       {}", stats.created);
    tracing::info!("Events revised:       {}", stats.revised);
    tracing::info!("No-match revisions:   {}", stats.no_match);
    tracing::info!("Persist failures:     {}", stats.persist_failures);

    Ok(())
}
