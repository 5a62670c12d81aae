//! Trusted decoder output shapes
//!
//! The decoder emits one of:
//! - a GeoJSON `FeatureCollection` of point (or line) features
//! - a single GeoJSON `Feature` or bare `LineString` geometry
//! - an array of frame records, bare or wrapped as `{ version, details, frames }`
//!
//! Each shape has its own mapping into [`DecodedFrame`] so the normalizer only
//! ever sees flat frames.

use crate::conversion::{normalize_timestamp_ms, parse_datetime_ms};
use crate::error::{ParseError, Result};
use crate::types::{BatteryReading, DecodedFrame};
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError};
use tracing::debug;

/// Which shape a decoder document had
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    FeatureCollection,
    Feature,
    LineString,
    FrameArray,
}

/// Flight-level information from the wrapper's `details` object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogDetails {
    #[serde(deserialize_with = "deserialize_label")]
    pub product_type: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    pub aircraft_name: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    pub aircraft_sn: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    pub battery_sn: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    pub app_version: Option<String>,
    /// Photo capture positions reported outside the frame stream
    #[serde(deserialize_with = "lenient_f64_vec")]
    pub moment_pic_latitude: Vec<f64>,
    #[serde(deserialize_with = "lenient_f64_vec")]
    pub moment_pic_longitude: Vec<f64>,
}

/// A decoder document reduced to flat frames
#[derive(Debug, Clone)]
pub struct DecoderDocument {
    pub shape: OutputShape,
    pub version: Option<u8>,
    pub details: LogDetails,
    pub frames: Vec<DecodedFrame>,
}

// Frame records

/// One decoder frame; each block is read on its own so a malformed block
/// leaves the others intact
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FrameRecord {
    #[serde_as(as = "DefaultOnError")]
    custom: Option<CustomBlock>,
    #[serde_as(as = "DefaultOnError")]
    osd: Option<OsdBlock>,
    #[serde_as(as = "DefaultOnError")]
    gimbal: Option<GimbalBlock>,
    #[serde_as(as = "DefaultOnError")]
    camera: Option<CameraBlock>,
    #[serde_as(as = "DefaultOnError")]
    rc: Option<RcBlock>,
    #[serde_as(as = "DefaultOnError")]
    battery: Option<BatteryBlock>,
    #[serde_as(as = "DefaultOnError")]
    recover: Option<RecoverBlock>,
    #[serde_as(as = "DefaultOnError")]
    app: Option<AppBlock>,
    #[serde(deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CustomBlock {
    #[serde(deserialize_with = "deserialize_label")]
    date_time: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OsdBlock {
    #[serde(deserialize_with = "lenient_f64")]
    fly_time: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    latitude: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    longitude: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    altitude: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    height: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    x_speed: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    y_speed: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    yaw: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    gps_num: Option<u32>,
    #[serde(alias = "isGPSUsed", deserialize_with = "lenient_bool")]
    is_gps_used: Option<bool>,
    #[serde(deserialize_with = "lenient_i64")]
    voltage_warning: Option<i64>,
    #[serde(deserialize_with = "lenient_bool")]
    is_compass_error: Option<bool>,
    #[serde(deserialize_with = "deserialize_label")]
    imu_init_fail_reason: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    is_motor_blocked: Option<bool>,
    #[serde(deserialize_with = "deserialize_label")]
    motor_start_failed_cause: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    is_barometer_dead_in_air: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GimbalBlock {
    #[serde(deserialize_with = "lenient_f64")]
    pitch: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    is_stuck: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CameraBlock {
    #[serde(deserialize_with = "lenient_bool")]
    is_photo: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    is_video: Option<bool>,
    #[serde(deserialize_with = "lenient_u32")]
    photo_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RcBlock {
    #[serde(deserialize_with = "lenient_i64")]
    uplink_signal: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    downlink_signal: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BatteryBlock {
    #[serde(deserialize_with = "lenient_f64")]
    charge_level: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    voltage: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    min_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    max_temperature: Option<f64>,
    #[serde(deserialize_with = "lenient_f64_vec")]
    cell_voltages: Vec<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    cell_voltage_deviation: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    current_capacity: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    full_capacity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RecoverBlock {
    #[serde(deserialize_with = "deserialize_label")]
    product_type: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    aircraft_name: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    aircraft_sn: Option<String>,
    #[serde(deserialize_with = "deserialize_label")]
    battery_sn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppBlock {
    #[serde(deserialize_with = "deserialize_label")]
    warn: Option<String>,
}

// GeoJSON

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    FeatureCollection {
        #[serde(default)]
        features: Vec<Feature>,
    },
    Feature {
        geometry: Option<Geometry>,
        #[serde(default)]
        properties: Option<Value>,
    },
    LineString {
        coordinates: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Point { coordinates: Vec<f64> },
    LineString { coordinates: Vec<Vec<f64>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PointProperties {
    timestamp: Option<Value>,
    time: Option<Value>,
    #[serde(deserialize_with = "deserialize_label")]
    date_time: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    fly_time: Option<f64>,
    #[serde(alias = "height", deserialize_with = "lenient_f64")]
    altitude: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    speed: Option<f64>,
    #[serde(alias = "yaw", deserialize_with = "lenient_f64")]
    heading: Option<f64>,
    #[serde(alias = "gpsNum", deserialize_with = "lenient_u32")]
    satellites: Option<u32>,
    #[serde(alias = "chargeLevel", deserialize_with = "lenient_f64")]
    battery_percent: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    is_photo: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    is_video: Option<bool>,
}

/// Accept strings or numbers for enum-like decoder fields
fn deserialize_label<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(label_from_value))
}

fn label_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Decoder versions disagree on field types: counters arrive as `12.0`, flags
// as `0`/`1` and empty arrays as `null`. These readers take any of them and
// turn anything unusable into "missing".

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(integer_from_value))
}

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(integer_from_value)
        .and_then(|n| u32::try_from(n).ok()))
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(bool_from_value))
}

fn lenient_f64_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Ok(items.iter().filter_map(number_from_value).collect()),
        _ => Ok(Vec::new()),
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn integer_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Timestamp in milliseconds from a number (seconds or milliseconds) or a date string
fn timestamp_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(normalize_timestamp_ms),
        Value::String(s) => parse_datetime_ms(s),
        _ => None,
    }
}

/// Parse decoder output text into flat frames
///
/// Frames keep only the time their source states; placing untimed frames on a
/// timeline is left to the normalizer.
///
/// # Errors
///
/// Returns [`ParseError::MalformedOutput`] if the text is not JSON or is not one
/// of the recognized shapes.
pub fn parse_decoder_output(text: &str) -> Result<DecoderDocument> {
    let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))?;

    match value {
        Value::Array(frames) => Ok(DecoderDocument {
            shape: OutputShape::FrameArray,
            version: None,
            details: LogDetails::default(),
            frames: frames_from_records(frames),
        }),
        Value::Object(mut map) if map.contains_key("frames") => {
            let frames = match map.remove("frames") {
                Some(Value::Array(frames)) => frames,
                _ => {
                    return Err(ParseError::MalformedOutput(
                        "\"frames\" is not an array".to_string(),
                    ))
                }
            };
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok());
            let details = match map.get("details") {
                Some(details) => LogDetails::deserialize(details).unwrap_or_else(|e| {
                    debug!("Ignoring unreadable details object: {}", e);
                    LogDetails::default()
                }),
                None => LogDetails::default(),
            };
            Ok(DecoderDocument {
                shape: OutputShape::FrameArray,
                version,
                details,
                frames: frames_from_records(frames),
            })
        }
        other @ Value::Object(_) if other.get("type").is_some() => {
            let document = GeoJson::deserialize(&other).map_err(|e| {
                ParseError::MalformedOutput(format!("unsupported GeoJSON document: {e}"))
            })?;
            Ok(geojson_document(document))
        }
        _ => Err(ParseError::MalformedOutput(
            "expected a frame array or a GeoJSON document".to_string(),
        )),
    }
}

fn geojson_document(document: GeoJson) -> DecoderDocument {
    let (shape, frames) = match document {
        GeoJson::FeatureCollection { features } => {
            let mut frames = Vec::with_capacity(features.len());
            for feature in features {
                append_feature(&mut frames, feature.geometry, feature.properties);
            }
            (OutputShape::FeatureCollection, frames)
        }
        GeoJson::Feature {
            geometry,
            properties,
        } => {
            let mut frames = Vec::new();
            append_feature(&mut frames, geometry, properties);
            (OutputShape::Feature, frames)
        }
        GeoJson::LineString { coordinates } => {
            (OutputShape::LineString, frames_from_line(&coordinates))
        }
    };

    DecoderDocument {
        shape,
        version: None,
        details: LogDetails::default(),
        frames,
    }
}

fn append_feature(
    frames: &mut Vec<DecodedFrame>,
    geometry: Option<Geometry>,
    properties: Option<Value>,
) {
    match geometry {
        Some(Geometry::Point { coordinates }) => {
            frames.push(frame_from_point(&coordinates, properties));
        }
        Some(Geometry::LineString { coordinates }) => {
            frames.extend(frames_from_line(&coordinates));
        }
        Some(Geometry::Unsupported) | None => {
            debug!("Skipping feature without point or line geometry");
        }
    }
}

/// Map a GeoJSON point feature; positions are `[lng, lat, alt?]`
fn frame_from_point(coordinates: &[f64], properties: Option<Value>) -> DecodedFrame {
    let props = properties
        .as_ref()
        .and_then(|p| PointProperties::deserialize(p).ok())
        .unwrap_or_default();

    let timestamp_ms = props
        .timestamp
        .as_ref()
        .and_then(timestamp_from_value)
        .or_else(|| props.time.as_ref().and_then(timestamp_from_value))
        .or_else(|| props.date_time.as_deref().and_then(parse_datetime_ms));

    DecodedFrame {
        timestamp_ms,
        fly_time_s: props.fly_time,
        lat: coordinates.get(1).copied(),
        lng: coordinates.first().copied(),
        altitude_m: props.altitude.or_else(|| coordinates.get(2).copied()),
        speed_mps: props.speed,
        heading_deg: props.heading,
        satellite_count: props.satellites,
        battery: BatteryReading {
            percent: props.battery_percent,
            ..Default::default()
        },
        is_photo: props.is_photo,
        is_video: props.is_video,
        raw: properties,
        ..Default::default()
    }
}

/// Explode a polyline into one untimed frame per vertex
fn frames_from_line(coordinates: &[Vec<f64>]) -> Vec<DecodedFrame> {
    coordinates
        .iter()
        .map(|vertex| DecodedFrame {
            lat: vertex.get(1).copied(),
            lng: vertex.first().copied(),
            altitude_m: vertex.get(2).copied(),
            ..Default::default()
        })
        .collect()
}

fn frames_from_records(records: Vec<Value>) -> Vec<DecodedFrame> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, raw)| match FrameRecord::deserialize(&raw) {
            Ok(record) => frame_from_record(record, raw),
            Err(e) => {
                debug!("Frame {} is not an object: {}", index, e);
                DecodedFrame {
                    raw: Some(raw),
                    ..Default::default()
                }
            }
        })
        .collect()
}

/// Map one nested frame record
///
/// Time comes from `custom.dateTime`, then a numeric `timestamp`. `osd.flyTime`
/// is kept separately in `fly_time_s`.
fn frame_from_record(record: FrameRecord, raw: Value) -> DecodedFrame {
    let custom = record.custom.unwrap_or_default();
    let osd = record.osd.unwrap_or_default();
    let gimbal = record.gimbal.unwrap_or_default();
    let camera = record.camera.unwrap_or_default();
    let rc = record.rc.unwrap_or_default();
    let battery = record.battery.unwrap_or_default();
    let recover = record.recover.unwrap_or_default();
    let app = record.app.unwrap_or_default();

    let timestamp_ms = custom
        .date_time
        .as_deref()
        .and_then(parse_datetime_ms)
        .or_else(|| {
            record
                .timestamp
                .or(custom.timestamp)
                .and_then(normalize_timestamp_ms)
        });

    let speed_mps = match (osd.x_speed, osd.y_speed) {
        (Some(x), Some(y)) => Some(x.hypot(y)),
        (Some(v), None) | (None, Some(v)) => Some(v.abs()),
        (None, None) => None,
    };

    DecodedFrame {
        timestamp_ms,
        fly_time_s: osd.fly_time,
        lat: osd.latitude,
        lng: osd.longitude,
        altitude_m: osd.height.or(osd.altitude),
        speed_mps,
        heading_deg: osd.yaw,
        gimbal_pitch_deg: gimbal.pitch,
        satellite_count: osd.gps_num,
        gps_used: osd.is_gps_used,
        battery: BatteryReading {
            percent: battery.charge_level,
            voltage: battery.voltage,
            current: battery.current,
            temperature: battery.temperature,
            min_temperature: battery.min_temperature,
            max_temperature: battery.max_temperature,
            cell_voltages: battery.cell_voltages,
            cell_voltage_deviation: battery.cell_voltage_deviation,
            current_capacity: battery.current_capacity,
            full_capacity: battery.full_capacity,
        },
        is_photo: camera.is_photo,
        is_video: camera.is_video,
        photo_count: camera.photo_count,
        voltage_warning: osd.voltage_warning,
        gimbal_stuck: gimbal.is_stuck,
        uplink_signal: rc.uplink_signal,
        downlink_signal: rc.downlink_signal,
        compass_error: osd.is_compass_error,
        imu_init_fail_reason: osd.imu_init_fail_reason,
        motor_blocked: osd.is_motor_blocked,
        motor_start_failed_cause: osd.motor_start_failed_cause,
        barometer_dead_in_air: osd.is_barometer_dead_in_air,
        app_warning: app.warn.filter(|w| !w.trim().is_empty()),
        product_type: recover.product_type,
        aircraft_name: recover.aircraft_name,
        aircraft_sn: recover.aircraft_sn,
        battery_sn: recover.battery_sn,
        raw: Some(raw),
    }
}
