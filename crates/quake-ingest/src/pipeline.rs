//! Pipeline coordinator.
//!
//! Wires Receiver -> Filter -> Parser -> Classifier -> Persistence into a
//! single-consumer processing loop. The coordinator owns the frame queue
//! and the process lifetime; no business logic lives here beyond routing
//! each frame through the stages.
//!
//! # Concurrency invariant
//!
//! Exactly one producer (the feed task) and one consumer (the processing
//! loop) share the bounded FIFO queue. Frames are processed one at a time
//! in arrival order, never concurrently, which is what makes the store's
//! check-then-act classification safe.
//!
//! # Error policy
//!
//! Per-message failures (duplicate, parse error, persistence error,
//! no-match revision) are counted, logged with the `source_id` and failure
//! kind where known, and skipped. Only a failed receiver ends the run
//! early; shutdown otherwise waits for the in-flight message and lets its
//! transaction finish, without draining the rest of the queue.

use crate::dedupe::DuplicateFilter;
use crate::error::{Error, Result};
use crate::feed::{FeedConfig, FeedSource};
use crate::parser::parse_notification;
use crate::store::{EventStore, PersistOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Configuration for the pipeline coordinator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the frame queue between the receiver and the processing
    /// loop. When full, the receiver blocks rather than dropping frames.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Counters accumulated over one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Frames received from the feed (including duplicates).
    pub frames_received: usize,
    /// Feed reconnection attempts.
    pub reconnects: usize,
    /// Frames dropped as consecutive duplicates.
    pub duplicates: usize,
    /// Frames dropped because parsing failed.
    pub parse_failures: usize,
    /// New events persisted.
    pub created: usize,
    /// Revisions applied to known events.
    pub revised: usize,
    /// Revisions whose current-state row was gone.
    pub no_match: usize,
    /// Messages dropped because the persistence transaction failed.
    pub persist_failures: usize,
}

/// Coordinator owning the queue and both concurrent loops.
pub struct Pipeline {
    store: EventStore,
    filter: DuplicateFilter,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
}

impl Pipeline {
    /// Create a pipeline around an opened store.
    pub fn new(store: EventStore, config: PipelineConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            store,
            filter: DuplicateFilter::new(),
            config,
            running,
        }
    }

    /// Run until the shutdown flag clears or the receiver fails.
    ///
    /// Spawns the feed task, then consumes frames one at a time. Returns
    /// the merged feed and processing statistics.
    pub async fn run(mut self, feed_config: FeedConfig) -> Result<PipelineStats> {
        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity);

        let source = FeedSource::new(feed_config, Arc::clone(&self.running));
        let receiver = tokio::spawn(async move { source.run(tx).await });

        let mut stats = PipelineStats::default();

        while self.running.load(Ordering::SeqCst) {
            // The 1-second timeout is how shutdown gets noticed while the
            // queue is empty.
            let frame = match timeout(Duration::from_secs(1), rx.recv()).await {
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(frame)) => frame,
            };
            self.process_frame(&frame, &mut stats);
        }

        // Unblock a receiver awaiting queue space; the rest of the queue is
        // deliberately not drained.
        drop(rx);

        match receiver.await {
            Ok(Ok(feed_stats)) => {
                stats.frames_received = feed_stats.frames_received;
                stats.reconnects = feed_stats.reconnects;
            }
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Error::Receiver(e.to_string())),
        }

        Ok(stats)
    }

    /// Process one raw frame: filter, parse, classify, persist.
    ///
    /// Never fails the loop; every per-message error is logged and the
    /// message dropped.
    fn process_frame(&mut self, raw: &str, stats: &mut PipelineStats) {
        if !self.filter.accept(raw) {
            stats.duplicates += 1;
            metrics::counter!("ingest_frames_duplicate_total").increment(1);
            tracing::debug!("dropped consecutive duplicate frame");
            return;
        }

        let event = match parse_notification(raw) {
            Ok(event) => event,
            Err(e) => {
                stats.parse_failures += 1;
                metrics::counter!("ingest_parse_failures_total").increment(1);
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match self.store.apply(&event) {
            Ok(PersistOutcome::Created) => {
                stats.created += 1;
                metrics::counter!("ingest_events_created_total").increment(1);
                tracing::info!(
                    source_id = event.source_id,
                    magnitude = event.magnitude,
                    region = %event.region,
                    "new event recorded"
                );
            }
            Ok(PersistOutcome::Revised) => {
                stats.revised += 1;
                metrics::counter!("ingest_events_revised_total").increment(1);
                tracing::info!(
                    source_id = event.source_id,
                    magnitude = event.magnitude,
                    "event revised"
                );
            }
            Ok(PersistOutcome::NoMatch) => {
                stats.no_match += 1;
                metrics::counter!("ingest_revisions_no_match_total").increment(1);
                tracing::warn!(
                    source_id = event.source_id,
                    "revision matched no current-state row, rolled back"
                );
            }
            Err(e) => {
                stats.persist_failures += 1;
                metrics::counter!("ingest_persist_failures_total").increment(1);
                tracing::error!(
                    source_id = event.source_id,
                    error = %e,
                    "persistence failed, dropping message"
                );
            }
        }
    }
}
