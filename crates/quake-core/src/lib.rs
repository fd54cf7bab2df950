//! Shared building blocks for the quake ingestion system.
//!
//! This crate holds the pieces that are not specific to any one daemon:
//!
//! - [`event`] - the seismic event data model and feed timestamp parsing
//! - [`metrics`] - Prometheus recorder bootstrap and the `/metrics` endpoint
//! - [`error`] - shared error types

pub mod error;
pub mod event;
pub mod metrics;

pub use error::{Error, Result};
pub use event::{parse_feed_timestamp, EventRevision, SeismicEvent};
