//! Prometheus metrics helpers for the quake system.
//!
//! This module provides centralized metrics initialization and the metric
//! definitions used across quake components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quake_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize the Prometheus recorder
//!     let handle = init_metrics();
//!
//!     // Start the HTTP server for /metrics endpoint
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     // Now use metrics anywhere in your code
//!     use metrics::counter;
//!     counter!("ingest_frames_received_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`ingest_`, `feed_`, `store_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: use sparingly to avoid cardinality explosion

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for the metrics emitted by the ingestion daemon.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // Feed source
    describe_counter!(
        "ingest_frames_received_total",
        "Raw text frames received from the feed"
    );
    describe_counter!(
        "ingest_feed_reconnects_total",
        "Reconnection attempts after a feed drop"
    );

    // Processing loop
    describe_counter!(
        "ingest_frames_duplicate_total",
        "Frames dropped as exact repeats of the previous frame"
    );
    describe_counter!(
        "ingest_parse_failures_total",
        "Frames dropped because the payload could not be parsed"
    );
    describe_counter!(
        "ingest_events_created_total",
        "First sightings persisted as new current-state rows"
    );
    describe_counter!(
        "ingest_events_revised_total",
        "Revisions applied to existing current-state rows"
    );
    describe_counter!(
        "ingest_revisions_no_match_total",
        "Revisions whose current-state row vanished before the update"
    );
    describe_counter!(
        "ingest_persist_failures_total",
        "Messages dropped because the persistence transaction failed"
    );

    // Daemon
    describe_gauge!(
        "ingest_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );
}
