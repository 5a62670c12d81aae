//! Heuristic extraction of GPS points from an undecoded log buffer
//!
//! Used only when no trusted decoder is installed. Record boundaries are
//! unknown, so the buffer is sampled at a fixed stride for byte patterns that
//! decode to plausible coordinates. Everything found here is a guess; the
//! candidates go through [`crate::parser::gps::validate_candidates`] before
//! anything is returned.

use crate::config::HeuristicConfig;
use crate::conversion::{clamp_offset_ms, date_from_filename};
use crate::parser::gps::{is_coordinate_shaped, validate_candidates};
use crate::parser::stream::LogDataStream;
use crate::stats::{resolve_duration, summarize};
use crate::types::{
    FlightLog, FlightLogDataPoint, FlightMetadata, LogHeader, ParserKind, RawCandidatePoint,
};
use tracing::{debug, info};

/// Extra offsets tried when nothing decodes at a stride boundary
const SECONDARY_OFFSETS: [usize; 3] = [8, 16, 24];

/// Offsets after the coordinate pair checked for an altitude value
const ALTITUDE_OFFSETS: [usize; 3] = [0, 4, 8];

/// Altitudes accepted from the scan, in meters
const ALTITUDE_RANGE: std::ops::RangeInclusive<f64> = -500.0..=10_000.0;

/// Binary encodings a coordinate pair may take, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateLayout {
    /// Two little-endian `f64` degrees
    F64Pair,
    /// Two little-endian `i32` in units of 1e-7 degrees
    I32E7Pair,
    /// Two little-endian `f32` degrees
    F32Pair,
}

impl CoordinateLayout {
    pub const PRIORITY: [CoordinateLayout; 3] = [
        CoordinateLayout::F64Pair,
        CoordinateLayout::I32E7Pair,
        CoordinateLayout::F32Pair,
    ];

    /// Bytes occupied by one encoded pair
    pub fn pair_len(self) -> usize {
        match self {
            CoordinateLayout::F64Pair => 16,
            CoordinateLayout::I32E7Pair | CoordinateLayout::F32Pair => 8,
        }
    }

    /// Decode the pair starting at `offset`, without any plausibility check
    pub fn decode(self, stream: &LogDataStream<'_>, offset: usize) -> Option<(f64, f64)> {
        let second = offset.checked_add(self.pair_len() / 2)?;
        match self {
            CoordinateLayout::F64Pair => {
                Some((stream.peek_f64_at(offset)?, stream.peek_f64_at(second)?))
            }
            CoordinateLayout::I32E7Pair => Some((
                f64::from(stream.peek_i32_at(offset)?) * 1e-7,
                f64::from(stream.peek_i32_at(second)?) * 1e-7,
            )),
            CoordinateLayout::F32Pair => Some((
                f64::from(stream.peek_f32_at(offset)?),
                f64::from(stream.peek_f32_at(second)?),
            )),
        }
    }

    fn index(self) -> usize {
        match self {
            CoordinateLayout::F64Pair => 0,
            CoordinateLayout::I32E7Pair => 1,
            CoordinateLayout::F32Pair => 2,
        }
    }
}

/// A coordinate pair found in the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutHit {
    pub offset: usize,
    pub layout: CoordinateLayout,
    pub lat: f64,
    pub lng: f64,
}

/// First layout that decodes to a coordinate-shaped pair at `offset`
pub fn decode_at(stream: &LogDataStream<'_>, offset: usize) -> Option<LayoutHit> {
    CoordinateLayout::PRIORITY.into_iter().find_map(|layout| {
        let (lat, lng) = layout.decode(stream, offset)?;
        is_coordinate_shaped(lat, lng).then_some(LayoutHit {
            offset,
            layout,
            lat,
            lng,
        })
    })
}

/// Try the stride boundary, then the secondary offsets after it
fn scan_offset(stream: &LogDataStream<'_>, base: usize) -> Option<LayoutHit> {
    decode_at(stream, base).or_else(|| {
        SECONDARY_OFFSETS
            .iter()
            .find_map(|extra| decode_at(stream, base.checked_add(*extra)?))
    })
}

/// Look for an altitude just after a decoded pair
///
/// Each offset is read first as `f32` meters, then as `i32` centimeters. Zero
/// and near-zero values are skipped since they are far more often padding than
/// a real ground-level reading.
fn read_altitude(stream: &LogDataStream<'_>, after_pair: usize) -> Option<f64> {
    ALTITUDE_OFFSETS.iter().find_map(|extra| {
        let offset = after_pair.checked_add(*extra)?;

        let meters = stream.peek_f32_at(offset).map(f64::from);
        if let Some(alt) =
            meters.filter(|a| a.is_finite() && a.abs() >= 0.01 && ALTITUDE_RANGE.contains(a))
        {
            return Some(alt);
        }

        stream
            .peek_i32_at(offset)
            .filter(|cm| *cm != 0)
            .map(|cm| cm as f64 / 100.0)
            .filter(|alt| ALTITUDE_RANGE.contains(alt))
    })
}

/// Scan `data` for coordinate candidates
///
/// Timestamps are synthetic, one `cadence_ms` step per candidate, since real
/// record times cannot be recovered without decoding the format.
pub fn scan_candidates(data: &[u8], config: &HeuristicConfig) -> Vec<RawCandidatePoint> {
    let stream = LogDataStream::new(data);
    let stride = config.stride.max(1);
    let mut candidates = Vec::new();
    let mut layout_hits = [0usize; 3];

    let mut offset = config.header_len;
    while offset < stream.len() && candidates.len() < config.max_candidates {
        if let Some(hit) = scan_offset(&stream, offset) {
            layout_hits[hit.layout.index()] += 1;
            let altitude_m = read_altitude(&stream, hit.offset + hit.layout.pair_len());
            candidates.push(RawCandidatePoint {
                time_offset_ms: candidates.len() as u64 * config.cadence_ms,
                lat: hit.lat,
                lng: hit.lng,
                altitude_m,
            });
        }
        offset += stride;
    }

    if candidates.len() >= config.max_candidates {
        info!(
            "Candidate cap of {} reached at offset {} of {}",
            config.max_candidates,
            offset,
            stream.len()
        );
    }
    debug!(
        "Layout hits: f64 {}, i32e7 {}, f32 {}",
        layout_hits[0], layout_hits[1], layout_hits[2]
    );
    candidates
}

/// Best-effort GPS track from a raw buffer
///
/// Never fails. An empty result means no usable telemetry was found.
pub fn extract_heuristic_points(
    data: &[u8],
    config: &HeuristicConfig,
) -> Vec<FlightLogDataPoint> {
    let candidates = scan_candidates(data, config);
    if candidates.is_empty() {
        info!("Heuristic scan of {} bytes found no candidates", data.len());
        return Vec::new();
    }

    validate_candidates(candidates, config)
        .into_iter()
        .map(|candidate| FlightLogDataPoint {
            timestamp_offset_ms: clamp_offset_ms(
                i64::try_from(candidate.time_offset_ms).unwrap_or(i64::MAX),
            ),
            lat: Some(candidate.lat),
            lng: Some(candidate.lng),
            altitude_m: candidate.altitude_m,
            ..Default::default()
        })
        .collect()
}

/// Assemble a flight log from heuristic points
///
/// The caller is expected to have applied the quality gates in
/// [`crate::filters`] first.
pub fn build_heuristic_flight_log(
    filename: &str,
    header: Option<&LogHeader>,
    data_points: Vec<FlightLogDataPoint>,
) -> FlightLog {
    let summary = summarize(&data_points);
    let duration = resolve_duration(None, &data_points);

    let mut metadata = FlightMetadata::new(ParserKind::Heuristic);
    if let Some(header) = header {
        metadata.format_version = Some(header.format_version);
        metadata
            .extra
            .insert("recordsEnd".to_string(), header.records_end.to_string());
    }

    FlightLog {
        filename: filename.to_string(),
        flight_date: date_from_filename(filename),
        drone_model: None,
        duration_seconds: duration.seconds,
        max_altitude_m: summary.max_altitude_m,
        max_speed_mps: summary.max_speed_mps,
        max_distance_m: summary.max_distance_m,
        total_distance_m: summary.total_distance_m,
        home_location: summary.home_location,
        start_location: summary.start_location,
        end_location: summary.end_location,
        battery_start_percent: None,
        battery_end_percent: None,
        warnings: Vec::new(),
        errors: Vec::new(),
        data_points,
        metadata,
    }
}
