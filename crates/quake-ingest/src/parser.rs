//! Feed payload parsing and normalization.
//!
//! Each websocket frame carries a JSON envelope whose `data.properties`
//! object holds the fields the pipeline cares about:
//! `mag`, `flynn_region`, `lat`, `lon`, `depth`, `time`, `lastupdate`,
//! `source_id`. Everything else in the envelope is ignored.
//!
//! Parse failures are per-message: the caller logs the error, drops the
//! frame, and moves on to the next queue item.

use crate::error::{Error, Result};
use quake_core::{parse_feed_timestamp, SeismicEvent};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    properties: Properties,
}

/// The `data.properties` object as the feed sends it.
#[derive(Debug, Deserialize)]
struct Properties {
    mag: f64,
    flynn_region: String,
    lat: f64,
    lon: f64,
    depth: f64,
    time: String,
    lastupdate: String,
    source_id: Value,
}

/// Decode one raw frame into a normalized [`SeismicEvent`].
///
/// Fails if the JSON is malformed, a required field is absent, the
/// `source_id` is not integer-like, or a timestamp does not match the
/// feed's layout.
pub fn parse_notification(raw: &str) -> Result<SeismicEvent> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| Error::Json(e.to_string()))?;
    let props = envelope.data.properties;

    let source_id = parse_source_id(&props.source_id)?;
    let event_time = parse_feed_timestamp(&props.time)?;
    let last_updated = parse_feed_timestamp(&props.lastupdate)?;

    Ok(SeismicEvent {
        source_id,
        magnitude: props.mag,
        region: props.flynn_region,
        latitude: props.lat,
        longitude: props.lon,
        depth_km: props.depth,
        event_time,
        last_updated,
    })
}

/// Extract an integer `source_id`.
///
/// The feed is inconsistent here: most frames carry a JSON number, some a
/// numeric string.
fn parse_source_id(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| Error::Field {
            field: "source_id",
            reason: format!("not an integer: {n}"),
        }),
        Value::String(s) => s.trim().parse::<i64>().map_err(|e| Error::Field {
            field: "source_id",
            reason: format!("{e}: {s:?}"),
        }),
        other => Err(Error::Field {
            field: "source_id",
            reason: format!("unexpected type: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> String {
        r#"{
            "action": "create",
            "data": {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [25.2, 35.1, -10.0]},
                "properties": {
                    "source_id": 1712345,
                    "source_catalog": "EMSC-RTS",
                    "lastupdate": "2024-03-11T08:55:00.0Z",
                    "time": "2024-03-11T08:51:02.6Z",
                    "flynn_region": "CRETE, GREECE",
                    "lat": 35.1,
                    "lon": 25.2,
                    "depth": 10.0,
                    "evtype": "ke",
                    "mag": 4.7,
                    "magtype": "ml"
                }
            }
        }"#
        .to_string()
    }

    #[test]
    fn parse_valid_frame() {
        let event = parse_notification(&sample_frame()).unwrap();
        assert_eq!(event.source_id, 1712345);
        assert_eq!(event.magnitude, 4.7);
        assert_eq!(event.region, "CRETE, GREECE");
        assert_eq!(event.latitude, 35.1);
        assert_eq!(event.longitude, 25.2);
        assert_eq!(event.depth_km, 10.0);
        assert!(event.last_updated > event.event_time);
    }

    #[test]
    fn parse_string_source_id() {
        let frame = sample_frame().replace("1712345", "\"1712345\"");
        let event = parse_notification(&frame).unwrap();
        assert_eq!(event.source_id, 1712345);
    }

    #[test]
    fn reject_missing_source_id() {
        let frame = sample_frame().replace("\"source_id\": 1712345,", "");
        let err = parse_notification(&frame).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("source_id"));
    }

    #[test]
    fn reject_non_integer_source_id() {
        let frame = sample_frame().replace("1712345", "true");
        assert!(matches!(
            parse_notification(&frame).unwrap_err(),
            Error::Field {
                field: "source_id",
                ..
            }
        ));
    }

    #[test]
    fn reject_malformed_json() {
        assert!(matches!(
            parse_notification("{not json").unwrap_err(),
            Error::Json(_)
        ));
    }

    #[test]
    fn reject_bad_timestamp() {
        let frame = sample_frame().replace("2024-03-11T08:51:02.6Z", "yesterday");
        assert!(matches!(
            parse_notification(&frame).unwrap_err(),
            Error::Core(quake_core::Error::Timestamp { .. })
        ));
    }

    #[test]
    fn reject_missing_properties() {
        let err = parse_notification(r#"{"data": {"type": "Feature"}}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
