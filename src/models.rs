//! Data models for the cold-chain monitor.
//!
//! `Reading` and `Product` are the two persisted records. `Temperature` is the
//! normalized form of an inbound temperature value and `ReadingState` the
//! classification outcome computed from it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::normalize;

// ---

/// Normalized temperature of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    /// No temperature was supplied.
    Absent,
    /// A value was supplied but could not be coerced to a finite number.
    Invalid,
    /// Degrees Celsius.
    Celsius(f64),
}

impl Temperature {
    // ---
    /// The numeric value, if there is one.
    pub fn value(self) -> Option<f64> {
        match self {
            Temperature::Celsius(t) => Some(t),
            Temperature::Absent | Temperature::Invalid => None,
        }
    }
}

/// Classification of a reading against its product's acceptable range.
///
/// Wire names are kept stable since dashboards key off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingState {
    // ---
    #[serde(rename = "SIN_DATO")]
    NoData,
    #[serde(rename = "SIN_RANGO")]
    NoRange,
    #[serde(rename = "NO_REGISTRADO")]
    Unregistered,
    #[serde(rename = "ERROR_DATO")]
    InvalidData,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ALERTA")]
    Alert,
}

impl ReadingState {
    // ---
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingState::NoData => "SIN_DATO",
            ReadingState::NoRange => "SIN_RANGO",
            ReadingState::Unregistered => "NO_REGISTRADO",
            ReadingState::InvalidData => "ERROR_DATO",
            ReadingState::Ok => "OK",
            ReadingState::Alert => "ALERTA",
        }
    }
}

impl fmt::Display for ReadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "SIN_DATO" => Ok(ReadingState::NoData),
            "SIN_RANGO" => Ok(ReadingState::NoRange),
            "NO_REGISTRADO" => Ok(ReadingState::Unregistered),
            "ERROR_DATO" => Ok(ReadingState::InvalidData),
            "OK" => Ok(ReadingState::Ok),
            "ALERTA" => Ok(ReadingState::Alert),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingSource {
    /// Automated ingestion from the broker subscription.
    #[serde(rename = "mqtt_auto")]
    Broker,
    /// Created by an operator through the HTTP API.
    #[serde(rename = "manual")]
    Manual,
}

impl ReadingSource {
    // ---
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingSource::Broker => "mqtt_auto",
            ReadingSource::Manual => "manual",
        }
    }
}

impl FromStr for ReadingSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mqtt_auto" => Ok(ReadingSource::Broker),
            "manual" => Ok(ReadingSource::Manual),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

// ---

/// One classified temperature observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub id: Uuid,
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub state: ReadingState,
    pub source: ReadingSource,
}

/// Acceptable temperature envelope of a product.
///
/// Either bound may be missing and the bounds may be inverted; the classifier
/// deals with both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    // ---
    #[serde(default, deserialize_with = "lenient_bound")]
    pub min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bound")]
    pub max: Option<f64>,
}

/// A catalog item with an acceptable temperature range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    // ---
    pub id: Uuid,
    pub name: String,
    pub tag_id: Option<String>,
    pub acceptable_range: TemperatureRange,
}

/// Request body for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    // ---
    pub name: String,
    #[serde(default)]
    pub acceptable_range: TemperatureRange,
    #[serde(default)]
    pub tag_id: Option<String>,
}

/// Request body for updating a product. The tag is changed only through
/// tag association.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductUpdate {
    // ---
    pub name: Option<String>,
    pub acceptable_range: Option<TemperatureRange>,
}

/// A product together with its newest reading, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithLastReading {
    // ---
    #[serde(flatten)]
    pub product: Product,
    pub last_reading_timestamp: Option<DateTime<Utc>>,
    pub last_state: Option<ReadingState>,
}

/// Reading statistics for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TagSummary {
    // ---
    pub tag_id: String,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub count: i64,
}

/// Accept a number or a numeric string; anything else becomes "no bound".
fn lenient_bound<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| normalize::coerce_temperature(&v).value()))
}
