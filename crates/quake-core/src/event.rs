//! Seismic event data model.
//!
//! Two entities back the whole system:
//!
//! - [`SeismicEvent`] - the current-state row for one event, keyed by the
//!   feed-assigned `source_id` and mutated in place on every revision
//! - [`EventRevision`] - an append-only log entry capturing the mutable
//!   subset of the event as it was observed at ingestion time
//!
//! The first revision for a `source_id` coincides with the event's creation;
//! every later one coincides with an in-place update. The current-state row
//! always mirrors the latest revision's `magnitude`/`depth_km`/`last_updated`.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Layout of feed timestamps once the trailing `Z` is stripped.
///
/// The feed sends ISO-8601 UTC timestamps such as `2024-03-11T08:51:02.6Z`,
/// with a fractional-second part of varying width that may be absent.
const FEED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Latest known state of one seismic event.
///
/// At most one live row exists per `source_id`. Rows are created on first
/// sighting and never deleted by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    /// Feed-assigned identifier, stable across revisions of the same event.
    pub source_id: i64,
    /// Magnitude as reported by the feed.
    pub magnitude: f64,
    /// Flinn-Engdahl region name (free text).
    pub region: String,
    /// Epicenter latitude in degrees.
    pub latitude: f64,
    /// Epicenter longitude in degrees.
    pub longitude: f64,
    /// Hypocenter depth in kilometers.
    pub depth_km: f64,
    /// When the event occurred, per the feed.
    pub event_time: NaiveDateTime,
    /// Timestamp of the most recent revision seen.
    pub last_updated: NaiveDateTime,
}

/// One observed state of an event, appended per processed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRevision {
    /// Identifier of the event this revision belongs to.
    pub source_id: i64,
    /// Magnitude at the time of this revision.
    pub magnitude: f64,
    /// Depth in kilometers at the time of this revision.
    pub depth_km: f64,
    /// The feed's `lastupdate` timestamp for this revision.
    pub last_updated: NaiveDateTime,
}

impl SeismicEvent {
    /// The revision entry mirroring this event's mutable fields.
    pub fn to_revision(&self) -> EventRevision {
        EventRevision {
            source_id: self.source_id,
            magnitude: self.magnitude,
            depth_km: self.depth_km,
            last_updated: self.last_updated,
        }
    }
}

/// Parse a timestamp as the feed formats it.
///
/// The trailing `Z` (the feed always emits UTC) is stripped before parsing,
/// matching the feed's documented layout. Fractional seconds are optional.
pub fn parse_feed_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(trimmed, FEED_TIMESTAMP_FORMAT).map_err(|source| {
        Error::Timestamp {
            value: raw.to_string(),
            source,
        }
    })
}
