//! Telemetry normalization for inbound broker payloads.
//!
//! Payloads go through two stages. [`decode`] runs in the broker task and only
//! decides whether the bytes are a JSON object and whether that object is a
//! self-test probe. [`normalize`] runs in the ingestion worker and turns the
//! object into typed [`Telemetry`]. Neither stage performs I/O.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::Temperature;

/// Keys that may carry the tag identifier, in lookup order.
const TAG_KEYS: [&str; 3] = ["epc", "tag_id", "tag"];

/// Keys that may carry the temperature, in lookup order.
const TEMPERATURE_KEYS: [&str; 3] = ["temperature", "temp", "temperatura"];

const TIMESTAMP_KEY: &str = "timestamp";
const SELF_TEST_KEY: &str = "test";

/// Smallest epoch accepted as milliseconds (1973-03-03). Anything below is
/// most likely epoch seconds and is treated as absent.
const MIN_EPOCH_MILLIS: i64 = 100_000_000_000;

// ---

/// A decoded broker payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Connectivity probe; never persisted.
    SelfTest,
    /// Telemetry object, still untyped.
    Telemetry(Map<String, Value>),
}

/// The payload could not be read as a JSON object.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is JSON but not an object")]
    NotAnObject,
}

/// Why a telemetry object could not become a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("payload carries no tag identifier")]
    MissingTag,
}

/// A validated reading ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    // ---
    pub tag_id: String,
    pub temperature: Temperature,
    /// `None` means "use ingestion time".
    pub timestamp: Option<DateTime<Utc>>,
}

// ---

/// Decode raw payload bytes.
pub fn decode(payload: &[u8]) -> Result<Inbound, DecodeError> {
    // ---
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => {
            if map.get(SELF_TEST_KEY).is_some_and(is_truthy) {
                Ok(Inbound::SelfTest)
            } else {
                Ok(Inbound::Telemetry(map))
            }
        }
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Extract typed telemetry from a decoded object.
pub fn normalize(map: &Map<String, Value>) -> Result<Telemetry, Rejection> {
    // ---
    let tag_id = TAG_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(tag_value)
        .ok_or(Rejection::MissingTag)?;

    let temperature = TEMPERATURE_KEYS
        .iter()
        .find_map(|key| map.get(*key))
        .map_or(Temperature::Absent, coerce_temperature);

    let timestamp = map.get(TIMESTAMP_KEY).and_then(parse_timestamp);

    Ok(Telemetry {
        tag_id,
        temperature,
        timestamp,
    })
}

/// Coerce an arbitrary JSON value to a temperature.
///
/// `null` is absent; numbers and numeric strings are values; everything else,
/// including strings that parse to a non-finite number, is invalid.
pub fn coerce_temperature(value: &Value) -> Temperature {
    // ---
    let parsed = match value {
        Value::Null => return Temperature::Absent,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };

    match parsed {
        Some(t) if t.is_finite() => Temperature::Celsius(t),
        _ => Temperature::Invalid,
    }
}

/// Parse an RFC 3339 string or an epoch-milliseconds number/string.
///
/// Epochs below `MIN_EPOCH_MILLIS` count as absent. That covers the probe
/// placeholder `"0"` and senders that report epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    // ---
    let millis = match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            s.parse::<i64>().ok()?
        }
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };

    if millis < MIN_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

fn tag_value(value: &Value) -> Option<String> {
    // ---
    let tag = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!tag.is_empty()).then_some(tag)
}

fn is_truthy(value: &Value) -> bool {
    // ---
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
