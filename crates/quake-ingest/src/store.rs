//! Classification and transactional persistence over SQLite.
//!
//! The [`EventStore`] is the sole writer of the `events` (current state) and
//! `event_revisions` (append-only history) tables. Each persistence
//! operation runs as one SQLite transaction: both statements commit together
//! or neither does, so the two tables can never disagree about how often an
//! event has been created-or-updated.
//!
//! The dashboard is a read-only SQL consumer of the same tables and has no
//! other coupling to this module.

use crate::error::Result;
use quake_core::{EventRevision, SeismicEvent};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Configuration for the event store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Classification of an incoming record against the current-state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// No `events` row exists for this `source_id`; first sighting.
    New,
    /// An `events` row exists and will be updated in place.
    Revision,
}

/// Typed outcome of one persistence operation.
///
/// `NoMatch` reports a revision whose current-state row vanished between the
/// existence check and the update (deleted out of band). The paired revision
/// insert is rolled back and the caller treats it as a recoverable anomaly,
/// distinct from a genuine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// A new current-state row and its first revision entry were committed.
    Created,
    /// One revision entry was appended and the current-state row updated.
    Revised,
    /// The update matched zero rows; nothing was committed.
    NoMatch,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    source_id    INTEGER PRIMARY KEY,
    magnitude    REAL NOT NULL,
    region       TEXT NOT NULL,
    latitude     REAL NOT NULL,
    longitude    REAL NOT NULL,
    depth        REAL NOT NULL,
    event_time   TEXT NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_revisions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id    INTEGER NOT NULL,
    magnitude    REAL NOT NULL,
    depth        REAL NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_revisions_source
    ON event_revisions (source_id);
";

/// SQLite-backed store for seismic events and their revision history.
///
/// Owned exclusively by the processing loop. The check-then-act sequence in
/// [`EventStore::apply`] is safe only because a single consumer ever
/// classifies and writes; concurrent consumers would need an upsert or
/// per-`source_id` serialization instead.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create the store at the given path.
    ///
    /// The schema is provisioned on first open.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, config)
    }

    /// Open an in-memory store. Used by tests and local experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, &StoreConfig::default())
    }

    fn init(conn: Connection, config: &StoreConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Classify `source_id` against the current-state table.
    pub fn classify(&self, source_id: i64) -> Result<EventClass> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT source_id FROM events WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match existing {
            Some(_) => EventClass::Revision,
            None => EventClass::New,
        })
    }

    /// Classify and persist one record.
    ///
    /// This is the single entry point the processing loop calls per
    /// non-duplicate message: a first sighting becomes a create, a known
    /// `source_id` becomes a revision.
    pub fn apply(&mut self, event: &SeismicEvent) -> Result<PersistOutcome> {
        match self.classify(event.source_id)? {
            EventClass::New => self.create_event(event),
            EventClass::Revision => self.revise_event(&event.to_revision()),
        }
    }

    /// Insert the current-state row and its first revision entry.
    ///
    /// Both inserts commit together or neither does.
    pub fn create_event(&mut self, event: &SeismicEvent) -> Result<PersistOutcome> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO events
                (source_id, magnitude, region, latitude, longitude, depth,
                 event_time, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.source_id,
                event.magnitude,
                event.region,
                event.latitude,
                event.longitude,
                event.depth_km,
                event.event_time,
                event.last_updated,
            ],
        )?;
        tx.execute(
            "INSERT INTO event_revisions (source_id, magnitude, depth, last_updated)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.source_id,
                event.magnitude,
                event.depth_km,
                event.last_updated,
            ],
        )?;

        tx.commit()?;
        Ok(PersistOutcome::Created)
    }

    /// Append a revision entry and update the matching current-state row.
    ///
    /// Both statements commit together or neither does. An update that
    /// matches zero rows rolls the revision insert back and yields
    /// [`PersistOutcome::NoMatch`].
    pub fn revise_event(&mut self, revision: &EventRevision) -> Result<PersistOutcome> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO event_revisions (source_id, magnitude, depth, last_updated)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                revision.source_id,
                revision.magnitude,
                revision.depth_km,
                revision.last_updated,
            ],
        )?;
        let updated = tx.execute(
            "UPDATE events
             SET magnitude = ?2, depth = ?3, last_updated = ?4
             WHERE source_id = ?1",
            params![
                revision.source_id,
                revision.magnitude,
                revision.depth_km,
                revision.last_updated,
            ],
        )?;

        if updated == 0 {
            tx.rollback()?;
            return Ok(PersistOutcome::NoMatch);
        }

        tx.commit()?;
        Ok(PersistOutcome::Revised)
    }

    /// Fetch the current state of one event, if present.
    pub fn get_event(&self, source_id: i64) -> Result<Option<SeismicEvent>> {
        let event = self
            .conn
            .query_row(
                "SELECT source_id, magnitude, region, latitude, longitude, depth,
                        event_time, last_updated
                 FROM events WHERE source_id = ?1",
                params![source_id],
                |row| {
                    Ok(SeismicEvent {
                        source_id: row.get(0)?,
                        magnitude: row.get(1)?,
                        region: row.get(2)?,
                        latitude: row.get(3)?,
                        longitude: row.get(4)?,
                        depth_km: row.get(5)?,
                        event_time: row.get(6)?,
                        last_updated: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(event)
    }

    /// Fetch all revision entries for one event, in insertion order.
    pub fn revisions(&self, source_id: i64) -> Result<Vec<EventRevision>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, magnitude, depth, last_updated
             FROM event_revisions WHERE source_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok(EventRevision {
                source_id: row.get(0)?,
                magnitude: row.get(1)?,
                depth_km: row.get(2)?,
                last_updated: row.get(3)?,
            })
        })?;

        let mut revisions = Vec::new();
        for row in rows {
            revisions.push(row?);
        }
        Ok(revisions)
    }

    /// Count revision entries for one event.
    pub fn revision_count(&self, source_id: i64) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_revisions WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quake_core::parse_feed_timestamp;

    fn test_event(source_id: i64, magnitude: f64, lastupdate: &str) -> SeismicEvent {
        SeismicEvent {
            source_id,
            magnitude,
            region: "CRETE, GREECE".to_string(),
            latitude: 35.1,
            longitude: 25.2,
            depth_km: 10.0,
            event_time: parse_feed_timestamp("2024-03-11T08:51:02.6Z").unwrap(),
            last_updated: parse_feed_timestamp(lastupdate).unwrap(),
        }
    }

    #[test]
    fn classify_fresh_id_as_new() {
        let store = EventStore::open_in_memory().unwrap();
        assert_eq!(store.classify(7).unwrap(), EventClass::New);
    }

    #[test]
    fn create_then_classify_as_revision() {
        let mut store = EventStore::open_in_memory().unwrap();
        let event = test_event(7, 3.0, "2024-03-11T08:55:00.0Z");

        assert_eq!(
            store.create_event(&event).unwrap(),
            PersistOutcome::Created
        );
        assert_eq!(store.classify(7).unwrap(), EventClass::Revision);
    }

    #[test]
    fn create_writes_both_tables() {
        let mut store = EventStore::open_in_memory().unwrap();
        store
            .create_event(&test_event(7, 3.0, "2024-03-11T08:55:00.0Z"))
            .unwrap();

        let current = store.get_event(7).unwrap().unwrap();
        assert_eq!(current.magnitude, 3.0);
        assert_eq!(store.revision_count(7).unwrap(), 1);

        let revision = &store.revisions(7).unwrap()[0];
        assert_eq!(revision.magnitude, 3.0);
        assert_eq!(revision.last_updated, current.last_updated);
    }

    #[test]
    fn apply_routes_new_then_revision() {
        let mut store = EventStore::open_in_memory().unwrap();

        let m1 = test_event(7, 3.0, "2024-03-11T08:55:00.0Z");
        let m2 = test_event(7, 3.4, "2024-03-11T09:10:00.0Z");

        assert_eq!(store.apply(&m1).unwrap(), PersistOutcome::Created);
        assert_eq!(store.apply(&m2).unwrap(), PersistOutcome::Revised);

        // Current state mirrors the latest revision.
        let current = store.get_event(7).unwrap().unwrap();
        assert_eq!(current.magnitude, 3.4);
        assert_eq!(current.last_updated, m2.last_updated);
        // The immutable attributes stay from the create.
        assert_eq!(current.region, "CRETE, GREECE");

        // History preserves arrival order.
        let revisions = store.revisions(7).unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].magnitude, 3.0);
        assert_eq!(revisions[1].magnitude, 3.4);
    }

    #[test]
    fn revision_count_tracks_processed_messages() {
        let mut store = EventStore::open_in_memory().unwrap();
        for (i, mag) in [2.1, 2.3, 2.5, 2.4].iter().enumerate() {
            let lastupdate = format!("2024-03-11T09:{:02}:00.0Z", i);
            store.apply(&test_event(11, *mag, &lastupdate)).unwrap();
        }
        assert_eq!(store.revision_count(11).unwrap(), 4);
    }

    #[test]
    fn revise_missing_row_reports_no_match() {
        let mut store = EventStore::open_in_memory().unwrap();
        let revision = test_event(5, 2.0, "2024-03-11T08:55:00.0Z").to_revision();

        assert_eq!(
            store.revise_event(&revision).unwrap(),
            PersistOutcome::NoMatch
        );
        // The revision insert was rolled back with the failed update.
        assert_eq!(store.revision_count(5).unwrap(), 0);
    }

    #[test]
    fn revise_rolls_back_when_update_fails() {
        let mut store = EventStore::open_in_memory().unwrap();
        store
            .create_event(&test_event(7, 3.0, "2024-03-11T08:55:00.0Z"))
            .unwrap();
        assert_eq!(store.revision_count(7).unwrap(), 1);

        // Force the second statement to fail outright.
        store.conn.execute_batch("DROP TABLE events").unwrap();

        let revision = test_event(7, 3.4, "2024-03-11T09:10:00.0Z").to_revision();
        assert!(store.revise_event(&revision).is_err());

        // No orphan revision entry was left behind.
        assert_eq!(store.revision_count(7).unwrap(), 1);
    }

    #[test]
    fn create_rolls_back_when_revision_insert_fails() {
        let mut store = EventStore::open_in_memory().unwrap();

        // Force the second statement to fail outright.
        store
            .conn
            .execute_batch("DROP TABLE event_revisions")
            .unwrap();

        assert!(store
            .create_event(&test_event(9, 3.0, "2024-03-11T08:55:00.0Z"))
            .is_err());

        // No orphan current-state row was left behind.
        assert!(store.get_event(9).unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("events.db");
        let config = StoreConfig::default();

        {
            let mut store = EventStore::open(&path, &config).unwrap();
            store
                .apply(&test_event(7, 3.0, "2024-03-11T08:55:00.0Z"))
                .unwrap();
        }

        let store = EventStore::open(&path, &config).unwrap();
        assert_eq!(store.get_event(7).unwrap().unwrap().magnitude, 3.0);
        assert_eq!(store.revision_count(7).unwrap(), 1);
    }
}
