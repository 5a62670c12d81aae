//! Structured frame normalizer
//!
//! Turns trusted decoder output into a [`FlightLog`]: frames are filtered for
//! GPS, put on a common time base, checked for anomalies and folded into
//! flight statistics.

use crate::config::NormalizerConfig;
use crate::conversion::{
    clamp_offset_ms, date_from_epoch_ms, date_from_filename, photo_filename,
};
use crate::error::{ParseError, ParseResult};
use crate::geo::haversine_distance_m;
use crate::parser::event::detect_anomalies;
use crate::parser::shapes::{parse_decoder_output, DecoderDocument, LogDetails};
use crate::stats::{resolve_duration, summarize};
use crate::types::{
    DecodedFrame, FlightLog, FlightLogDataPoint, FlightMetadata, GeoPoint, ParserKind,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Parse and normalize decoder output text
///
/// # Errors
///
/// - [`ParseError::MalformedOutput`] if the text has no recognizable shape or
///   holds no frames or features at all
/// - [`ParseError::NoGpsData`] if frames exist but none has a usable position
pub fn normalize_decoder_output(
    text: &str,
    filename: &str,
    config: &NormalizerConfig,
) -> ParseResult {
    let document = parse_decoder_output(text)?;
    normalize_document(document, filename, config)
}

/// Normalize an already parsed decoder document
pub fn normalize_document(
    document: DecoderDocument,
    filename: &str,
    config: &NormalizerConfig,
) -> ParseResult {
    let DecoderDocument {
        shape,
        version,
        details,
        frames,
    } = document;

    if frames.is_empty() {
        return Err(ParseError::MalformedOutput(
            "decoder output contained no frames or features".to_string(),
        ));
    }
    let total_frames = frames.len();
    debug!("Normalizing {} frames from {:?} output", total_frames, shape);

    // Whole-log values come from every frame, including those without GPS
    let max_fly_time_s = frames
        .iter()
        .filter_map(|f| f.fly_time_s)
        .filter(|t| t.is_finite() && *t > 0.0)
        .reduce(f64::max);
    let mut metadata = collect_metadata(&details, &frames);
    metadata.format_version = version;
    metadata
        .extra
        .insert("outputShape".to_string(), format!("{shape:?}"));

    let frames = select_gps_frames(frames);
    if frames.is_empty() {
        return Err(ParseError::NoGpsData {
            frames: total_frames,
        });
    }

    let timeline = build_timeline(frames, config.line_cadence_ms);
    let start_epoch_ms = timeline.first_timestamp_ms;
    let flight_date = resolve_flight_date(start_epoch_ms, filename);

    let anomalies = detect_anomalies(
        timeline.frames.iter().map(|(offset, frame)| (*offset, frame)),
        config.anomaly_window_ms,
    );

    let mut camera = CameraEventDetector::new(config.emit_camera_events, start_epoch_ms);
    let mut data_points: Vec<FlightLogDataPoint> = timeline
        .frames
        .into_iter()
        .map(|(offset, frame)| camera.to_data_point(offset, frame))
        .collect();

    if !details.moment_pic_latitude.is_empty() {
        correlate_moment_photos(
            &mut data_points,
            &details,
            config.photo_match_radius_m,
            start_epoch_ms,
            camera.photo_index,
        );
    }

    let summary = summarize(&data_points);
    let duration = resolve_duration(max_fly_time_s, &data_points);
    debug!(
        "Duration {:.1}s from {:?}",
        duration.seconds, duration.source
    );

    let drone_model = metadata.extra.remove("productType");
    metadata.start_time_ms = start_epoch_ms.filter(|ts| date_from_epoch_ms(*ts).is_some());

    Ok(FlightLog {
        filename: filename.to_string(),
        flight_date,
        drone_model,
        duration_seconds: duration.seconds,
        max_altitude_m: summary.max_altitude_m,
        max_speed_mps: summary.max_speed_mps,
        max_distance_m: summary.max_distance_m,
        total_distance_m: summary.total_distance_m,
        home_location: summary.home_location,
        start_location: summary.start_location,
        end_location: summary.end_location,
        battery_start_percent: summary.battery_start_percent,
        battery_end_percent: summary.battery_end_percent,
        warnings: anomalies.warnings,
        errors: anomalies.errors,
        data_points,
        metadata,
    })
}

fn has_position(frame: &DecodedFrame) -> bool {
    frame.position().is_some_and(|p| p.is_valid())
}

/// Keep frames with a usable position
///
/// The first pass also requires the decoder not to have flagged the fix as
/// unused. If that leaves nothing, a second pass accepts any valid position.
fn select_gps_frames(frames: Vec<DecodedFrame>) -> Vec<DecodedFrame> {
    let total = frames.len();
    let locked = frames
        .iter()
        .filter(|f| has_position(f) && f.gps_used != Some(false))
        .count();

    let selected: Vec<DecodedFrame> = if locked > 0 {
        frames
            .into_iter()
            .filter(|f| has_position(f) && f.gps_used != Some(false))
            .collect()
    } else {
        debug!("No frames with GPS lock, retrying without the lock requirement");
        frames.into_iter().filter(|f| has_position(f)).collect()
    };

    info!("{} of {} frames had GPS", selected.len(), total);
    selected
}

/// Clock the timeline of one document is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeBasis {
    /// Timestamps stated by the frames
    Stated,
    /// Decoder-reported elapsed flight time
    FlyTime,
    /// Input order at the configured cadence
    Sequence,
}

struct Timeline {
    /// Earliest time on the timeline, when it is built from stated timestamps
    first_timestamp_ms: Option<i64>,
    /// Frames sorted by offset, one per offset
    frames: Vec<(u32, DecodedFrame)>,
}

fn fly_time_ms(frame: &DecodedFrame) -> Option<i64> {
    frame
        .fly_time_s
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(|t| (t * 1000.0).round() as i64)
}

/// Put frames on offsets from the earliest time of a single basis
///
/// Stated timestamps win over fly time, which wins over input order; sources
/// are never mixed within one document. If any stated timestamp is a plausible
/// epoch, the implausible ones count as missing. Frames without a time on the
/// chosen basis follow the previous frame by `cadence_ms`, and leading ones
/// precede the first timed frame by the same step. The sort is stable and
/// equal offsets keep the earliest input frame.
fn build_timeline(frames: Vec<DecodedFrame>, cadence_ms: u64) -> Timeline {
    let cadence = i64::try_from(cadence_ms).unwrap_or(i64::MAX);

    let basis = if frames.iter().any(|f| f.timestamp_ms.is_some()) {
        TimeBasis::Stated
    } else if frames.iter().any(|f| fly_time_ms(f).is_some()) {
        TimeBasis::FlyTime
    } else {
        TimeBasis::Sequence
    };
    let epoch_only = basis == TimeBasis::Stated
        && frames
            .iter()
            .filter_map(|f| f.timestamp_ms)
            .any(|ts| date_from_epoch_ms(ts).is_some());

    let stated: Vec<Option<i64>> = frames
        .iter()
        .map(|frame| match basis {
            TimeBasis::Stated => frame
                .timestamp_ms
                .filter(|ts| !epoch_only || date_from_epoch_ms(*ts).is_some()),
            TimeBasis::FlyTime => fly_time_ms(frame),
            TimeBasis::Sequence => None,
        })
        .collect();

    let (first_index, first_time) = stated
        .iter()
        .enumerate()
        .find_map(|(i, t)| t.map(|t| (i, t)))
        .unwrap_or((0, 0));
    let untimed = stated.iter().filter(|t| t.is_none()).count();
    if untimed > 0 && basis != TimeBasis::Sequence {
        debug!(
            "{} of {} frames have no {:?} time, spacing them at {} ms",
            untimed,
            stated.len(),
            basis,
            cadence_ms
        );
    }

    let steps_before = i64::try_from(first_index + 1).unwrap_or(i64::MAX);
    let mut previous = first_time.saturating_sub(cadence.saturating_mul(steps_before));
    let times: Vec<i64> = stated
        .iter()
        .copied()
        .map(|time| {
            let time = time.unwrap_or_else(|| previous.saturating_add(cadence));
            previous = time;
            time
        })
        .collect();

    let base = times.iter().copied().min().unwrap_or(0);
    let mut timed: Vec<(u32, DecodedFrame)> = times
        .into_iter()
        .zip(frames)
        .map(|(time, frame)| (clamp_offset_ms(time.saturating_sub(base)), frame))
        .collect();

    let before = timed.len();
    timed.sort_by_key(|(offset, _)| *offset);
    timed.dedup_by_key(|(offset, _)| *offset);
    if timed.len() < before {
        debug!(
            "Dropped {} frames sharing an offset with an earlier frame",
            before - timed.len()
        );
    }

    Timeline {
        first_timestamp_ms: (basis == TimeBasis::Stated).then_some(base),
        frames: timed,
    }
}

/// Content date when plausible, else the date in the filename
fn resolve_flight_date(first_timestamp_ms: Option<i64>, filename: &str) -> Option<NaiveDate> {
    let from_content = first_timestamp_ms.and_then(date_from_epoch_ms);
    let from_filename = date_from_filename(filename);

    match (from_content, from_filename) {
        (Some(content), Some(named)) if content != named => {
            info!(
                "Flight date {} from log content differs from {} in filename {}",
                content, named, filename
            );
            Some(content)
        }
        (Some(content), _) => Some(content),
        (None, named) => {
            if first_timestamp_ms.is_some() {
                debug!(
                    "Log timestamps carry no plausible date, using filename date {:?}",
                    named
                );
            }
            named
        }
    }
}

fn first_frame_value(
    frames: &[DecodedFrame],
    pick: fn(&DecodedFrame) -> Option<&String>,
) -> Option<String> {
    frames.iter().find_map(|f| pick(f).cloned())
}

fn collect_metadata(details: &LogDetails, frames: &[DecodedFrame]) -> FlightMetadata {
    let mut metadata = FlightMetadata::new(ParserKind::TrustedDecoder);
    metadata.aircraft_name = details
        .aircraft_name
        .clone()
        .or_else(|| first_frame_value(frames, |f| f.aircraft_name.as_ref()));
    metadata.drone_serial = details
        .aircraft_sn
        .clone()
        .or_else(|| first_frame_value(frames, |f| f.aircraft_sn.as_ref()));
    metadata.battery_serial = details
        .battery_sn
        .clone()
        .or_else(|| first_frame_value(frames, |f| f.battery_sn.as_ref()));

    if let Some(product) = details
        .product_type
        .clone()
        .or_else(|| first_frame_value(frames, |f| f.product_type.as_ref()))
    {
        metadata.extra.insert("productType".to_string(), product);
    }
    if let Some(version) = &details.app_version {
        metadata
            .extra
            .insert("appVersion".to_string(), version.clone());
    }
    metadata
}

/// Photo and video markers derived from frame flags
///
/// When disabled every point is emitted without camera events. When enabled a
/// photo is either an explicit `is_photo` flag or an increase of the camera's
/// photo counter to a value not seen before.
struct CameraEventDetector {
    enabled: bool,
    start_epoch_ms: Option<i64>,
    last_count: Option<u32>,
    seen_counts: HashSet<u32>,
    photo_index: u32,
}

impl CameraEventDetector {
    fn new(enabled: bool, first_timestamp_ms: Option<i64>) -> Self {
        Self {
            enabled,
            start_epoch_ms: first_timestamp_ms.filter(|ts| date_from_epoch_ms(*ts).is_some()),
            last_count: None,
            seen_counts: HashSet::new(),
            photo_index: 0,
        }
    }

    fn is_photo(&mut self, frame: &DecodedFrame) -> bool {
        let flagged = frame.is_photo == Some(true);

        let counted = match frame.photo_count {
            Some(count) => {
                let increased = self.last_count.is_some_and(|last| count > last);
                self.last_count = Some(count);
                increased && self.seen_counts.insert(count)
            }
            None => false,
        };

        flagged || counted
    }

    fn to_data_point(&mut self, offset_ms: u32, frame: DecodedFrame) -> FlightLogDataPoint {
        let (is_photo, is_video_recording) = if self.enabled {
            (self.is_photo(&frame), frame.is_video == Some(true))
        } else {
            (false, false)
        };

        let photo_filename = if is_photo {
            self.photo_index += 1;
            self.start_epoch_ms
                .and_then(|start| photo_filename(start + i64::from(offset_ms), self.photo_index))
        } else {
            None
        };

        FlightLogDataPoint {
            timestamp_offset_ms: offset_ms,
            lat: frame.lat,
            lng: frame.lng,
            altitude_m: frame.altitude_m,
            speed_mps: frame.speed_mps,
            heading_deg: frame.heading_deg,
            gimbal_pitch_deg: frame.gimbal_pitch_deg,
            battery: frame.battery,
            satellite_count: frame.satellite_count,
            is_photo,
            photo_filename,
            is_video_recording,
            raw: frame.raw,
        }
    }
}

/// Flag the nearest point to each moment marker as a photo
///
/// A marker is matched only within `radius_m` and never to a point that is
/// already a photo.
fn correlate_moment_photos(
    points: &mut [FlightLogDataPoint],
    details: &LogDetails,
    radius_m: f64,
    start_epoch_ms: Option<i64>,
    mut photo_index: u32,
) {
    let start_epoch_ms = start_epoch_ms.filter(|ts| date_from_epoch_ms(*ts).is_some());
    let markers = details
        .moment_pic_latitude
        .iter()
        .zip(&details.moment_pic_longitude)
        .map(|(lat, lng)| GeoPoint::new(*lat, *lng))
        .filter(GeoPoint::is_valid);

    let mut matched = 0usize;
    let mut total = 0usize;
    for marker in markers {
        total += 1;
        let nearest = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Some((i, haversine_distance_m(marker, p.position()?))))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let Some((index, distance_m)) = nearest else {
            continue;
        };
        if distance_m > radius_m {
            debug!(
                "Moment marker at {:.6},{:.6} is {:.0} m from the track",
                marker.lat, marker.lng, distance_m
            );
            continue;
        }

        let point = &mut points[index];
        if point.is_photo {
            continue;
        }
        photo_index += 1;
        point.is_photo = true;
        point.photo_filename = start_epoch_ms.and_then(|start| {
            photo_filename(start + i64::from(point.timestamp_offset_ms), photo_index)
        });
        matched += 1;
    }

    if matched < total {
        warn!("Matched {} of {} moment markers to the track", matched, total);
    } else {
        info!("Matched {} moment markers to the track", matched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    fn normalize(text: &str) -> ParseResult {
        normalize_decoder_output(text, "flight.txt", &NormalizerConfig::default())
    }

    #[test]
    fn test_three_frame_scenario() {
        let text = r#"[
            {"osd": {"latitude": 37.0, "longitude": -122.0, "flyTime": 0}},
            {"osd": {"latitude": 37.001, "longitude": -122.001, "flyTime": 5}},
            {"osd": {"latitude": 37.002, "longitude": -122.002, "flyTime": 10}}
        ]"#;
        let log = normalize(text).unwrap();

        let p0 = GeoPoint::new(37.0, -122.0);
        let p1 = GeoPoint::new(37.001, -122.001);
        let p2 = GeoPoint::new(37.002, -122.002);
        let expected = haversine_distance_m(p0, p1) + haversine_distance_m(p1, p2);

        assert_eq!(log.duration_seconds, 10.0);
        assert_eq!(log.data_points.len(), 3);
        assert_eq!(log.home_location, Some(p0));
        assert!((log.total_distance_m - expected).abs() < 1e-6);
        assert_eq!(log.metadata.parser, ParserKind::TrustedDecoder);
    }

    #[test]
    fn test_no_frames_vs_no_gps() {
        let err = normalize("[]").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MalformedOutput);

        let err = normalize(r#"[{"osd": {"flyTime": 1}}, {"osd": {"latitude": 0, "longitude": 0}}]"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::NoGpsData { frames: 2 }));
    }

    #[test]
    fn test_gps_lock_retry() {
        let text = r#"[
            {"osd": {"latitude": 37.0, "longitude": -122.0, "isGPSUsed": false}},
            {"osd": {"latitude": 37.0001, "longitude": -122.0, "isGPSUsed": false}}
        ]"#;
        assert_eq!(normalize(text).unwrap().data_points.len(), 2);

        let mixed = r#"[
            {"osd": {"latitude": 37.0, "longitude": -122.0, "isGPSUsed": false}},
            {"osd": {"latitude": 37.0001, "longitude": -122.0, "isGPSUsed": true}}
        ]"#;
        assert_eq!(normalize(mixed).unwrap().data_points.len(), 1);
    }

    #[test]
    fn test_offsets_sorted_and_unique() {
        let text = r#"[
            {"timestamp": 1714558832.0, "osd": {"latitude": 37.002, "longitude": -122.0}},
            {"timestamp": 1714558830.0, "osd": {"latitude": 37.000, "longitude": -122.0}},
            {"timestamp": 1714558831.0, "osd": {"latitude": 37.001, "longitude": -122.0}},
            {"timestamp": 1714558831.0, "osd": {"latitude": 37.009, "longitude": -122.0}}
        ]"#;
        let log = normalize(text).unwrap();
        let offsets: Vec<_> = log
            .data_points
            .iter()
            .map(|p| p.timestamp_offset_ms)
            .collect();
        assert_eq!(offsets, vec![0, 1_000, 2_000]);
        assert_eq!(log.data_points[0].lat, Some(37.0));
        // Equal offsets keep the earlier input frame
        assert_eq!(log.data_points[1].lat, Some(37.001));
        assert_eq!(log.flight_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn test_one_bad_date_does_not_split_the_timeline() {
        let frames: Vec<String> = (0..20)
            .map(|i| {
                let date_time = if i == 0 {
                    String::new()
                } else {
                    format!("2024-05-01T10:20:{i:02}Z")
                };
                format!(
                    r#"{{"custom": {{"dateTime": "{}"}},
                        "osd": {{"latitude": {}, "longitude": -122.0, "flyTime": {}}}}}"#,
                    date_time,
                    37.0 + i as f64 * 1e-4,
                    i
                )
            })
            .collect();
        let log = normalize(&format!("[{}]", frames.join(","))).unwrap();

        let offsets: Vec<_> = log
            .data_points
            .iter()
            .map(|p| p.timestamp_offset_ms)
            .collect();
        assert_eq!(offsets.len(), 20);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(offsets[..3], [0, 100, 1_100]);
        assert_eq!(offsets[19], 18_100);
        assert_eq!(log.duration_seconds, 19.0);
        assert_eq!(log.data_points[0].lat, Some(37.0));
        assert_eq!(log.flight_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(log.metadata.start_time_ms, Some(1_714_558_800_900));
    }

    #[test]
    fn test_relative_timestamp_among_epochs_is_untimed() {
        let text = r#"[
            {"timestamp": 1714558830, "osd": {"latitude": 37.0, "longitude": -122.0}},
            {"timestamp": 5, "osd": {"latitude": 37.0001, "longitude": -122.0}},
            {"timestamp": 1714558832, "osd": {"latitude": 37.0002, "longitude": -122.0}}
        ]"#;
        let log = normalize(text).unwrap();
        let offsets: Vec<_> = log
            .data_points
            .iter()
            .map(|p| p.timestamp_offset_ms)
            .collect();
        assert_eq!(offsets, vec![0, 100, 2_000]);
        assert_eq!(log.data_points[1].lat, Some(37.0001));
    }

    #[test]
    fn test_fly_time_basis_ignores_untimed_frames() {
        let text = r#"[
            {"osd": {"latitude": 37.0, "longitude": -122.0}},
            {"osd": {"latitude": 37.0001, "longitude": -122.0, "flyTime": 4}},
            {"osd": {"latitude": 37.0002, "longitude": -122.0}},
            {"osd": {"latitude": 37.0003, "longitude": -122.0, "flyTime": 6}}
        ]"#;
        let log = normalize(text).unwrap();
        let offsets: Vec<_> = log
            .data_points
            .iter()
            .map(|p| p.timestamp_offset_ms)
            .collect();
        assert_eq!(offsets, vec![0, 100, 200, 2_100]);
        assert_eq!(log.metadata.start_time_ms, None);
    }

    #[test]
    fn test_flight_date_falls_back_to_filename() {
        let text = r#"[{"osd": {"latitude": 37.0, "longitude": -122.0, "flyTime": 3}}]"#;
        let log = normalize_decoder_output(
            text,
            "DJIFlightRecord_2023-08-14_[09-10-11].txt",
            &NormalizerConfig::default(),
        )
        .unwrap();
        assert_eq!(log.flight_date, NaiveDate::from_ymd_opt(2023, 8, 14));
    }

    #[test]
    fn test_camera_events_follow_policy() {
        let text = r#"[
            {"custom": {"dateTime": "2024-05-01T10:20:30Z"},
             "osd": {"latitude": 37.0, "longitude": -122.0}, "camera": {"photoCount": 4}},
            {"custom": {"dateTime": "2024-05-01T10:20:31Z"},
             "osd": {"latitude": 37.0001, "longitude": -122.0}, "camera": {"photoCount": 5, "isVideo": true}},
            {"custom": {"dateTime": "2024-05-01T10:20:32Z"},
             "osd": {"latitude": 37.0002, "longitude": -122.0}, "camera": {"photoCount": 5}},
            {"custom": {"dateTime": "2024-05-01T10:20:33Z"},
             "osd": {"latitude": 37.0003, "longitude": -122.0}, "camera": {"isPhoto": true}}
        ]"#;

        let log = normalize(text).unwrap();
        assert_eq!(log.photo_count(), 0);
        assert!(log.data_points.iter().all(|p| !p.is_video_recording));

        let config = NormalizerConfig {
            emit_camera_events: true,
            ..Default::default()
        };
        let log = normalize_decoder_output(text, "flight.txt", &config).unwrap();
        let photos: Vec<_> = log.data_points.iter().map(|p| p.is_photo).collect();
        assert_eq!(photos, vec![false, true, false, true]);
        assert!(log.data_points[1].is_video_recording);
        assert_eq!(
            log.data_points[1].photo_filename.as_deref(),
            Some("DJI_20240501102031_0001_D.DNG")
        );
    }

    #[test]
    fn test_moment_markers_within_radius() {
        let text = r#"{
            "details": {"momentPicLatitude": [37.0010, 38.0],
                        "momentPicLongitude": [-122.0, -122.0],
                        "productType": "Mini4Pro", "aircraftSn": "SN123"},
            "frames": [
                {"custom": {"dateTime": "2024-05-01T10:20:30Z"},
                 "osd": {"latitude": 37.0, "longitude": -122.0}},
                {"custom": {"dateTime": "2024-05-01T10:20:40Z"},
                 "osd": {"latitude": 37.0009, "longitude": -122.0},
                 "recover": {"batterySn": "BAT9"}}
            ]
        }"#;
        let log = normalize(text).unwrap();

        assert_eq!(log.photo_count(), 1);
        assert!(log.data_points[1].is_photo);
        assert_eq!(
            log.data_points[1].photo_filename.as_deref(),
            Some("DJI_20240501102040_0001_D.DNG")
        );
        assert_eq!(log.drone_model.as_deref(), Some("Mini4Pro"));
        assert_eq!(log.metadata.drone_serial.as_deref(), Some("SN123"));
        assert_eq!(log.metadata.battery_serial.as_deref(), Some("BAT9"));
    }

    #[test]
    fn test_battery_start_end_and_anomalies() {
        let frames: Vec<String> = (0..100)
            .map(|i| {
                format!(
                    r#"{{"osd": {{"latitude": 37.0, "longitude": {}, "flyTime": {}}},
                        "battery": {{"chargeLevel": 15, "voltage": 14.1}}}}"#,
                    -122.0 + i as f64 * 1e-5,
                    i as f64 * 0.02
                )
            })
            .collect();
        let text = format!("[{}]", frames.join(","));
        let log = normalize(&text).unwrap();

        assert_eq!(log.data_points.len(), 100);
        let battery_warnings = log
            .warnings
            .iter()
            .filter(|w| w.category == "battery")
            .count();
        assert_eq!(battery_warnings, 1);
        assert_eq!(log.battery_start_percent, Some(15.0));
        assert_eq!(log.battery_end_percent, Some(15.0));
        assert_eq!(log.data_points[0].battery.voltage, Some(14.1));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let text = r#"{
            "details": {"momentPicLatitude": [37.001], "momentPicLongitude": [-122.001]},
            "frames": [
                {"osd": {"latitude": 37.0, "longitude": -122.0, "flyTime": 0, "gpsNum": 4},
                 "app": {"warn": "Strong wind"}},
                {"osd": {"latitude": 37.001, "longitude": -122.001, "flyTime": 5, "isCompassError": true}}
            ]
        }"#;
        assert_eq!(normalize(text).unwrap(), normalize(text).unwrap());
    }
}
