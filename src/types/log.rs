use crate::types::{AnomalyRecord, GeoPoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Battery health sample attached to a data point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryReading {
    pub percent: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    #[serde(default)]
    pub cell_voltages: Vec<f64>,
    pub cell_voltage_deviation: Option<f64>,
    pub current_capacity: Option<f64>,
    pub full_capacity: Option<f64>,
}

impl BatteryReading {
    pub fn is_empty(&self) -> bool {
        self == &BatteryReading::default()
    }
}

/// One normalized telemetry sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightLogDataPoint {
    /// Milliseconds since flight start, clamped to `[0, i32::MAX]`
    pub timestamp_offset_ms: u32,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub gimbal_pitch_deg: Option<f64>,
    pub battery: BatteryReading,
    pub satellite_count: Option<u32>,
    pub is_photo: bool,
    pub photo_filename: Option<String>,
    pub is_video_recording: bool,
    /// Original source fields, opaque to this crate
    pub raw: Option<serde_json::Value>,
}

impl FlightLogDataPoint {
    /// Position when both coordinates are present and valid
    pub fn position(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.lat?, self.lng?);
        point.is_valid().then_some(point)
    }
}

/// Which strategy produced a flight log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    TrustedDecoder,
    Heuristic,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::TrustedDecoder => "trusted-decoder",
            ParserKind::Heuristic => "heuristic",
        }
    }
}

/// Free-form information discovered while parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightMetadata {
    pub parser: ParserKind,
    pub format_version: Option<u8>,
    /// Absolute start of the flight in epoch milliseconds, when the log carries it
    pub start_time_ms: Option<i64>,
    pub aircraft_name: Option<String>,
    pub drone_serial: Option<String>,
    pub battery_serial: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl FlightMetadata {
    pub fn new(parser: ParserKind) -> Self {
        Self {
            parser,
            format_version: None,
            start_time_ms: None,
            aircraft_name: None,
            drone_serial: None,
            battery_serial: None,
            extra: BTreeMap::new(),
        }
    }
}

/// One parsed flight session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightLog {
    pub filename: String,
    pub flight_date: Option<NaiveDate>,
    pub drone_model: Option<String>,
    pub duration_seconds: f64,
    pub max_altitude_m: f64,
    pub max_speed_mps: f64,
    pub max_distance_m: f64,
    pub total_distance_m: f64,
    pub home_location: Option<GeoPoint>,
    pub start_location: Option<GeoPoint>,
    pub end_location: Option<GeoPoint>,
    pub battery_start_percent: Option<f64>,
    pub battery_end_percent: Option<f64>,
    pub warnings: Vec<AnomalyRecord>,
    pub errors: Vec<AnomalyRecord>,
    pub data_points: Vec<FlightLogDataPoint>,
    pub metadata: FlightMetadata,
}

impl FlightLog {
    /// Number of data points with a valid position
    pub fn gps_point_count(&self) -> usize {
        self.data_points
            .iter()
            .filter(|p| p.position().is_some())
            .count()
    }

    /// Number of data points flagged as photo captures
    pub fn photo_count(&self) -> usize {
        self.data_points.iter().filter(|p| p.is_photo).count()
    }

    /// All anomalies, errors first, each group in time order
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.errors.iter().chain(self.warnings.iter())
    }
}
