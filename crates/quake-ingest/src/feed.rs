//! Live feed source.
//!
//! Maintains one persistent websocket connection to the seismic feed and
//! forwards each received text frame, in arrival order, into the pipeline
//! queue. No payload transformation happens here.
//!
//! # Backpressure
//!
//! The queue is bounded; when it fills, the forwarding `send().await`
//! blocks the read loop until the consumer catches up. Frames are never
//! dropped on the enqueue side.
//!
//! # Reconnection
//!
//! A dropped or failed connection moves the source through
//! `Connected -> Disconnected -> Reconnecting(delay) -> Connected`. The
//! delay doubles from `initial_backoff` up to `max_backoff` and resets on a
//! successful connection. With `retry_budget = None` the source retries
//! forever; otherwise it gives up after that many consecutive failures.

use crate::error::{Error, Result};
use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::Message;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Configuration for the feed source.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Websocket endpoint of the feed.
    pub url: String,

    /// Timeout for establishing one connection.
    pub connect_timeout: Duration,

    /// First reconnect delay after a drop.
    pub initial_backoff: Duration,

    /// Ceiling for the reconnect delay.
    pub max_backoff: Duration,

    /// Consecutive connection failures tolerated before giving up.
    /// `None` retries forever.
    pub retry_budget: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://www.seismicportal.eu/standing_order/websocket".to_string(),
            connect_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            retry_budget: None,
        }
    }
}

/// Statistics reported by the feed source when it stops.
#[derive(Debug, Default, Clone)]
pub struct FeedStats {
    /// Text frames forwarded to the queue.
    pub frames_received: usize,
    /// Reconnection attempts after a drop or connect failure.
    pub reconnects: usize,
}

/// Live websocket feed source.
///
/// The source never touches storage; its only output is the frame queue.
pub struct FeedSource {
    config: FeedConfig,
    running: Arc<AtomicBool>,
}

impl FeedSource {
    /// Create a feed source sharing the daemon's shutdown flag.
    pub fn new(config: FeedConfig, running: Arc<AtomicBool>) -> Self {
        Self { config, running }
    }

    /// Run the receive loop until shutdown or an exhausted retry budget.
    ///
    /// Each text frame goes into `frames` in arrival order; the send awaits
    /// when the queue is full.
    pub async fn run(&self, frames: mpsc::Sender<String>) -> Result<FeedStats> {
        let mut stats = FeedStats::default();
        let mut backoff = self.config.initial_backoff;
        let mut consecutive_failures: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            let connect = timeout(
                self.config.connect_timeout,
                connect_async(self.config.url.as_str()),
            )
            .await;

            let mut ws = match connect {
                Ok(Ok((ws, _response))) => {
                    tracing::info!(url = %self.config.url, "feed connected");
                    consecutive_failures = 0;
                    backoff = self.config.initial_backoff;
                    ws
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.config.url, error = %e, "feed connection failed");
                    consecutive_failures += 1;
                    self.check_budget(consecutive_failures)?;
                    stats.reconnects += 1;
                    metrics::counter!("ingest_feed_reconnects_total").increment(1);
                    backoff = self.backoff_sleep(backoff).await;
                    continue;
                }
                Err(_) => {
                    tracing::warn!(
                        url = %self.config.url,
                        timeout = ?self.config.connect_timeout,
                        "feed connection timed out"
                    );
                    consecutive_failures += 1;
                    self.check_budget(consecutive_failures)?;
                    stats.reconnects += 1;
                    metrics::counter!("ingest_feed_reconnects_total").increment(1);
                    backoff = self.backoff_sleep(backoff).await;
                    continue;
                }
            };

            // Read loop. Ends on close or error, after which we reconnect.
            // The 1-second timeout is how shutdown gets noticed while the
            // feed is quiet.
            while self.running.load(Ordering::SeqCst) {
                match timeout(Duration::from_secs(1), ws.next()).await {
                    Err(_) => continue,
                    Ok(None) => {
                        tracing::info!("feed stream ended");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        stats.frames_received += 1;
                        metrics::counter!("ingest_frames_received_total").increment(1);

                        if frames.send(text).await.is_err() {
                            if self.running.load(Ordering::SeqCst) {
                                return Err(Error::ChannelSend(
                                    "frame queue closed".to_string(),
                                ));
                            }
                            return Ok(stats);
                        }
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        tracing::info!(frame = ?frame, "feed sent close frame");
                        break;
                    }
                    // Ping/pong are answered by tungstenite; binary frames
                    // are not part of the feed protocol.
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        tracing::warn!(error = %e, "feed read error");
                        break;
                    }
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            stats.reconnects += 1;
            metrics::counter!("ingest_feed_reconnects_total").increment(1);
            tracing::info!(delay = ?backoff, "reconnecting to feed");
            backoff = self.backoff_sleep(backoff).await;
        }

        tracing::info!(
            frames = stats.frames_received,
            reconnects = stats.reconnects,
            "feed source stopped"
        );
        Ok(stats)
    }

    fn check_budget(&self, consecutive_failures: u32) -> Result<()> {
        if let Some(budget) = self.config.retry_budget {
            if consecutive_failures >= budget {
                return Err(Error::RetryBudgetExhausted {
                    attempts: consecutive_failures,
                });
            }
        }
        Ok(())
    }

    /// Sleep for `delay` in short slices so shutdown is not held up by a
    /// long backoff, then return the next (doubled, capped) delay.
    async fn backoff_sleep(&self, delay: Duration) -> Duration {
        let mut remaining = delay;
        while self.running.load(Ordering::SeqCst) && !remaining.is_zero() {
            let step = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        (delay * 2).min(self.config.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(config: FeedConfig) -> FeedSource {
        FeedSource::new(config, Arc::new(AtomicBool::new(true)))
    }

    #[tokio::test]
    async fn backoff_doubles_up_to_ceiling() {
        let feed = source(FeedConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(25),
            ..Default::default()
        });

        let next = feed.backoff_sleep(Duration::from_millis(10)).await;
        assert_eq!(next, Duration::from_millis(20));
        let next = feed.backoff_sleep(next).await;
        assert_eq!(next, Duration::from_millis(25));
        let next = feed.backoff_sleep(next).await;
        assert_eq!(next, Duration::from_millis(25));
    }

    #[tokio::test]
    async fn backoff_sleep_cut_short_by_shutdown() {
        let running = Arc::new(AtomicBool::new(false));
        let feed = FeedSource::new(FeedConfig::default(), running);

        // Flag already cleared: returns without sleeping out the delay.
        let start = std::time::Instant::now();
        feed.backoff_sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn budget_enforced_only_when_configured() {
        let unlimited = source(FeedConfig {
            retry_budget: None,
            ..Default::default()
        });
        assert!(unlimited.check_budget(1000).is_ok());

        let bounded = source(FeedConfig {
            retry_budget: Some(3),
            ..Default::default()
        });
        assert!(bounded.check_budget(2).is_ok());
        assert!(matches!(
            bounded.check_budget(3).unwrap_err(),
            Error::RetryBudgetExhausted { attempts: 3 }
        ));
    }

    #[tokio::test]
    async fn unreachable_feed_exhausts_budget() {
        let feed = source(FeedConfig {
            // Nothing listens here.
            url: "ws://127.0.0.1:1/ws".to_string(),
            connect_timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            retry_budget: Some(2),
        });

        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            feed.run(tx).await.unwrap_err(),
            Error::RetryBudgetExhausted { attempts: 2 }
        ));
    }
}
