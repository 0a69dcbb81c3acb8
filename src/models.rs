//! Data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AisTrackerError;

/// Maritime Mobile Service Identity (MMSI)
///
/// A unique nine-digit number for identifying vessels in AIS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "MmsiRepr", into = "u32")]
pub struct Mmsi(u32);

/// MMSI as written in configuration: either a number or a decimal string
#[derive(Deserialize)]
#[serde(untagged)]
enum MmsiRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<MmsiRepr> for Mmsi {
    type Error = AisTrackerError;

    fn try_from(value: MmsiRepr) -> Result<Self, Self::Error> {
        match value {
            MmsiRepr::Number(n) => Self::try_from(n),
            MmsiRepr::Text(s) => Self::try_from(s.as_str()),
        }
    }
}

impl TryFrom<u32> for Mmsi {
    type Error = AisTrackerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 999_999_999 {
            return Err(AisTrackerError::InvalidMmsi(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Mmsi {
    type Error = AisTrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .trim()
            .parse::<u32>()
            .map_err(|_| AisTrackerError::InvalidMmsi(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl FromStr for Mmsi {
    type Err = AisTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<Mmsi> for u32 {
    fn from(mmsi: Mmsi) -> Self {
        mmsi.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Mmsi {
    /// Get the raw MMSI value
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// A point in WGS84 decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Rectangular geographic filter given by two opposite corners.
///
/// Serialized as `[[lat1, lon1], [lat2, lon2]]`, the shape the feed expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 2]; 2]", into = "[[f64; 2]; 2]")]
pub struct BoundingBox {
    pub first: Coordinate,
    pub second: Coordinate,
}

impl BoundingBox {
    pub fn new(first: Coordinate, second: Coordinate) -> Self {
        Self { first, second }
    }

    pub fn is_valid(&self) -> bool {
        self.first.is_valid() && self.second.is_valid()
    }
}

impl From<[[f64; 2]; 2]> for BoundingBox {
    fn from([[lat1, lon1], [lat2, lon2]]: [[f64; 2]; 2]) -> Self {
        Self::new(Coordinate::new(lat1, lon1), Coordinate::new(lat2, lon2))
    }
}

impl From<BoundingBox> for [[f64; 2]; 2] {
    fn from(bbox: BoundingBox) -> Self {
        [
            [bbox.first.lat, bbox.first.lon],
            [bbox.second.lat, bbox.second.lon],
        ]
    }
}

/// Vessel position as reported by the feed
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub mmsi: Mmsi,
    /// Latitude in WGS84 decimal degrees
    pub lat: f64,
    /// Longitude in WGS84 decimal degrees
    pub lon: f64,
    /// When this process received the report; the feed's own time is not used
    pub observed_at: DateTime<Utc>,
}

/// Side-channel vessel information carried in the envelope metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VesselMetadata {
    /// Ship name, trimmed of padding; empty if not available
    pub ship_name: String,
}

impl VesselMetadata {
    /// Read the optional fields out of the envelope's `MetaData` map.
    ///
    /// Absent keys and values of the wrong type fall back to defaults.
    pub fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let ship_name = map
            .get("ShipName")
            .and_then(serde_json::Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        Self { ship_name }
    }
}

/// Latest known position of a vessel, as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPositionRecord {
    pub mmsi: Mmsi,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub observed_at: DateTime<Utc>,
}

impl StoredPositionRecord {
    pub fn new(report: PositionReport, metadata: VesselMetadata) -> Self {
        Self {
            mmsi: report.mmsi,
            name: metadata.ship_name,
            lat: report.lat,
            lon: report.lon,
            observed_at: report.observed_at,
        }
    }

    /// Storage key; the MMSI in decimal
    pub fn vessel_id(&self) -> String {
        self.mmsi.to_string()
    }

    /// Observation time in seconds from Unix epoch
    pub fn observed_at_unix(&self) -> i64 {
        self.observed_at.timestamp()
    }
}
