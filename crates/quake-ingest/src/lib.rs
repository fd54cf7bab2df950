//! Quake ingestion pipeline components.
//!
//! This crate provides the pipeline that ingests seismic-event notifications
//! from the SeismicPortal real-time feed into a relational store, keeping the
//! latest known state of each event alongside a full revision history.
//!
//! # Modules
//!
//! - [`feed`] - websocket feed source with reconnect-with-backoff
//! - [`dedupe`] - consecutive-duplicate filter
//! - [`parser`] - payload decoding and timestamp normalization
//! - [`store`] - classifier and transactional persistence over SQLite
//! - [`pipeline`] - coordinator wiring the above into one processing loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FeedSource    │  websocket frames, arrival order
//! └────────┬────────┘
//!          │  bounded FIFO queue (backpressure)
//!          ▼
//! ┌─────────────────┐
//! │ DuplicateFilter │  drops exact repeats of the previous frame
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Parser      │  JSON envelope -> SeismicEvent
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   EventStore    │  classify NEW vs REVISION, atomic write
//! └─────────────────┘
//! ```
//!
//! A single consumer pulls from the queue and classifies-then-writes one
//! message at a time. That single-writer discipline is what makes the
//! classifier's check-then-act sequence safe without database-level locking;
//! scaling to multiple consumers would require per-`source_id` serialization
//! or an upsert.

pub mod dedupe;
pub mod error;
pub mod feed;
pub mod parser;
pub mod pipeline;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use dedupe::DuplicateFilter;
pub use feed::{FeedConfig, FeedSource, FeedStats};
pub use parser::parse_notification;
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use store::{EventClass, EventStore, PersistOutcome, StoreConfig};
