//! Timestamp normalisation.
//!
//! Backends hand timestamps back in whatever shape they store them:
//! `{seconds, nanoseconds}` objects, the admin-SDK style
//! `{_seconds, _nanoseconds}`, RFC 3339 strings, or epoch milliseconds. The
//! gateway converts every one of them to `DateTime<Utc>` exactly once, on the
//! way in, so nothing past the gateway ever sees a native shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Any timestamp shape a backend may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeTimestamp {
    Split { seconds: i64, nanoseconds: u32 },
    Underscored { _seconds: i64, _nanoseconds: u32 },
    Text(String),
    Millis(i64),
}

impl NativeTimestamp {
    /// Canonical form, or `None` for an unparseable value.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            NativeTimestamp::Split { seconds, nanoseconds }
            | NativeTimestamp::Underscored { _seconds: seconds, _nanoseconds: nanoseconds } => {
                DateTime::<Utc>::from_timestamp(*seconds, *nanoseconds)
            }
            NativeTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            NativeTimestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms),
        }
    }
}

/// Normalise a raw JSON value. `null`, absent and malformed values yield `None`.
pub fn normalize(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    serde_json::from_value::<NativeTimestamp>(value.clone())
        .ok()
        .and_then(|ts| ts.to_utc())
}

/// `{seconds, nanoseconds}` encoding.
pub fn to_split(ts: DateTime<Utc>) -> Value {
    json!({ "seconds": ts.timestamp(), "nanoseconds": ts.timestamp_subsec_nanos() })
}

/// RFC 3339 encoding with millisecond precision.
pub fn to_rfc3339(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_767_225_600, 250_000_000).unwrap()
    }

    #[test]
    fn test_every_native_shape_normalizes_to_the_same_instant() {
        let shapes = [
            json!({"seconds": 1_767_225_600i64, "nanoseconds": 250_000_000u32}),
            json!({"_seconds": 1_767_225_600i64, "_nanoseconds": 250_000_000u32}),
            json!("2026-01-01T00:00:00.250Z"),
            json!("2026-01-01T09:00:00.250+09:00"),
            json!(1_767_225_600_250i64),
        ];
        for shape in shapes {
            assert_eq!(normalize(Some(&shape)), Some(reference()), "shape {shape}");
        }
    }

    #[test]
    fn test_encoders_round_trip() {
        assert_eq!(normalize(Some(&to_split(reference()))), Some(reference()));
        assert_eq!(normalize(Some(&to_rfc3339(reference()))), Some(reference()));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&Value::Null)), None);
        assert_eq!(normalize(Some(&json!("yesterday"))), None);
        assert_eq!(normalize(Some(&json!({"secs": 1}))), None);
    }
}
