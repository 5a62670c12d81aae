//! Flight statistics shared by both parsing paths
//!
//! Statistics are computed by folding an explicit [`FlightAccumulator`] over the
//! ordered data points, so no running state outlives a single pass.

use crate::geo::haversine_distance_m;
use crate::types::{FlightLogDataPoint, GeoPoint};
use tracing::{debug, warn};

/// Points averaged to estimate the ground altitude at takeoff
const GROUND_REFERENCE_POINTS: usize = 10;
/// Altitudes accepted as a ground reference
const GROUND_ALTITUDE_RANGE: std::ops::RangeInclusive<f64> = -100.0..=1_000.0;
/// Absolute altitudes accepted when there is no ground reference
const FLIGHT_ALTITUDE_RANGE: std::ops::RangeInclusive<f64> = -100.0..=2_000.0;
/// Speeds above this are corrupt readings, not flight
const MAX_PLAUSIBLE_SPEED_MPS: f64 = 150.0;

/// Where a flight duration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    /// Decoder-reported elapsed flight time
    ElapsedField,
    /// Difference between the first and last point offsets
    Timestamps,
    /// Nothing to measure
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationEstimate {
    pub seconds: f64,
    pub source: DurationSource,
}

/// Resolve flight duration from an elapsed-time field or point offsets
///
/// A positive elapsed time wins. Otherwise the span between the earliest and
/// latest offsets is used. Sub-second durations over many points are logged
/// as suspicious but returned unchanged.
pub fn resolve_duration(
    elapsed_seconds: Option<f64>,
    points: &[FlightLogDataPoint],
) -> DurationEstimate {
    if let Some(elapsed) = elapsed_seconds.filter(|s| s.is_finite() && *s > 0.0) {
        debug!("Using decoder elapsed time for duration: {:.1}s", elapsed);
        return DurationEstimate {
            seconds: elapsed,
            source: DurationSource::ElapsedField,
        };
    }

    let mut offsets: Vec<u32> = points.iter().map(|p| p.timestamp_offset_ms).collect();
    if offsets.is_empty() {
        return DurationEstimate {
            seconds: 0.0,
            source: DurationSource::Unavailable,
        };
    }
    offsets.sort_unstable();

    let span_ms = offsets[offsets.len() - 1] - offsets[0];
    let seconds = span_ms as f64 / 1000.0;
    if seconds < 1.0 && points.len() > 10 {
        warn!(
            "Suspicious duration: {:.3}s across {} points",
            seconds,
            points.len()
        );
    }

    DurationEstimate {
        seconds,
        source: DurationSource::Timestamps,
    }
}

/// Aggregates derived from an ordered point sequence
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlightSummary {
    pub home_location: Option<GeoPoint>,
    pub start_location: Option<GeoPoint>,
    pub end_location: Option<GeoPoint>,
    pub total_distance_m: f64,
    pub max_distance_m: f64,
    pub max_speed_mps: f64,
    /// Maximum altitude relative to the ground reference when one exists
    pub max_altitude_m: f64,
    pub ground_reference_m: Option<f64>,
    pub battery_start_percent: Option<f64>,
    pub battery_end_percent: Option<f64>,
}

/// Running state threaded through a fold over the data points
#[derive(Debug, Clone, Default)]
pub struct FlightAccumulator {
    seen: usize,
    home: Option<GeoPoint>,
    last_position: Option<GeoPoint>,
    total_distance_m: f64,
    max_distance_m: f64,
    max_speed_mps: f64,
    ground_samples: Vec<f64>,
    max_altitude_m: Option<f64>,
    max_bounded_altitude_m: Option<f64>,
    battery_first: Option<f64>,
    battery_last: Option<f64>,
}

impl FlightAccumulator {
    /// Account for one more point, in time order
    pub fn step(mut self, point: &FlightLogDataPoint) -> Self {
        if let Some(position) = point.position() {
            let home = *self.home.get_or_insert(position);
            if let Some(previous) = self.last_position {
                self.total_distance_m += haversine_distance_m(previous, position);
            }
            self.max_distance_m = self.max_distance_m.max(haversine_distance_m(home, position));
            self.last_position = Some(position);
        }

        if let Some(altitude) = point.altitude_m.filter(|a| a.is_finite()) {
            if self.seen < GROUND_REFERENCE_POINTS && GROUND_ALTITUDE_RANGE.contains(&altitude) {
                self.ground_samples.push(altitude);
            }
            self.max_altitude_m = Some(self.max_altitude_m.map_or(altitude, |m| m.max(altitude)));
            if FLIGHT_ALTITUDE_RANGE.contains(&altitude) {
                self.max_bounded_altitude_m =
                    Some(self.max_bounded_altitude_m.map_or(altitude, |m| m.max(altitude)));
            }
        }

        if let Some(speed) = point
            .speed_mps
            .filter(|s| s.is_finite() && (0.0..=MAX_PLAUSIBLE_SPEED_MPS).contains(s))
        {
            self.max_speed_mps = self.max_speed_mps.max(speed);
        }

        if let Some(percent) = point.battery.percent {
            self.battery_first.get_or_insert(percent);
            self.battery_last = Some(percent);
        }

        self.seen += 1;
        self
    }

    pub fn finish(self) -> FlightSummary {
        let ground_reference_m = (self.home.is_some() && !self.ground_samples.is_empty())
            .then(|| self.ground_samples.iter().sum::<f64>() / self.ground_samples.len() as f64);

        let max_altitude_m = match ground_reference_m {
            Some(reference) => self.max_altitude_m.map_or(0.0, |max| (max - reference).max(0.0)),
            None => self.max_bounded_altitude_m.unwrap_or(0.0),
        };

        FlightSummary {
            home_location: self.home,
            start_location: self.home,
            end_location: self.last_position,
            total_distance_m: self.total_distance_m,
            max_distance_m: self.max_distance_m,
            max_speed_mps: self.max_speed_mps,
            max_altitude_m,
            ground_reference_m,
            battery_start_percent: self.battery_first,
            battery_end_percent: self.battery_last,
        }
    }
}

/// Fold the accumulator over `points`
pub fn summarize(points: &[FlightLogDataPoint]) -> FlightSummary {
    points
        .iter()
        .fold(FlightAccumulator::default(), FlightAccumulator::step)
        .finish()
}
