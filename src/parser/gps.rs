//! GPS candidate validation for the heuristic extractor
//!
//! Candidates found by scanning raw bytes are noisy. This module runs them
//! through a fixed pipeline:
//!
//! 1. axis-swap detection and correction
//! 2. range validation, coordinate dedup and a sequential plausibility filter
//! 3. a relaxed rerun when the strict filter discards nearly everything
//! 4. a lenient neighbor-outlier pass
//!
//! The order matters: a swap must be fixed before distances mean anything, and
//! the outlier pass assumes points are already time ordered.

use crate::config::HeuristicConfig;
use crate::geo::haversine_distance_m;
use crate::types::RawCandidatePoint;
use std::collections::HashSet;
use tracing::{debug, info};

/// Coordinates closer to zero than this are treated as null-island noise
pub const NEAR_ZERO_DEGREES: f64 = 0.01;

/// Dedup precision, 1e-6 degrees is about 0.1 m
const DEDUP_SCALE: f64 = 1e6;

/// Candidates with more points than this get the relaxation and outlier passes
const LARGE_SET: usize = 50;

/// True when `(lat, lng)` is inside the WGS84 range and not near zero
pub fn is_range_valid(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
        && lat.abs() > NEAR_ZERO_DEGREES
        && lng.abs() > NEAR_ZERO_DEGREES
}

/// True when the pair is range-valid in at least one axis order
///
/// The scanner keeps such pairs so that a track stored longitude-first
/// survives long enough for [`correct_axis_swap`] to see it.
pub fn is_coordinate_shaped(a: f64, b: f64) -> bool {
    is_range_valid(a, b) || is_range_valid(b, a)
}

fn is_axis_normal(point: &RawCandidatePoint) -> bool {
    point.lat.abs() <= 90.0 && point.lng.abs() <= 180.0
}

fn is_axis_swapped(point: &RawCandidatePoint) -> bool {
    point.lat.abs() > 90.0 && point.lat.abs() <= 180.0 && point.lng.abs() <= 90.0
}

fn count_range_valid(points: &[RawCandidatePoint]) -> usize {
    points
        .iter()
        .filter(|p| is_range_valid(p.lat, p.lng))
        .count()
}

/// Swap latitude and longitude across the whole set when clearly warranted
///
/// Needs at least `swap_min_candidates` points. The swapped count must be more
/// than twice the normal count and above `swap_majority` of all points, and the
/// swap is kept only if it raises the number of range-valid points by at least
/// `swap_min_gain`. A wrong swap silently corrupts a usable track, so anything
/// short of that leaves the set untouched.
///
/// Returns true if the set was swapped.
pub fn correct_axis_swap(points: &mut [RawCandidatePoint], config: &HeuristicConfig) -> bool {
    if points.len() < config.swap_min_candidates {
        return false;
    }

    let normal = points.iter().filter(|p| is_axis_normal(p)).count();
    let swapped = points.iter().filter(|p| is_axis_swapped(p)).count();
    let checked = points.len();

    let majority = swapped > 2 * normal && swapped as f64 > config.swap_majority * checked as f64;
    if !majority {
        debug!(
            "Axis swap not indicated: {} swapped, {} normal of {}",
            swapped, normal, checked
        );
        return false;
    }

    let valid_before = count_range_valid(points);
    let valid_after = points
        .iter()
        .filter(|p| is_range_valid(p.lng, p.lat))
        .count();

    let gain_ok = valid_after > valid_before
        && valid_after as f64 >= valid_before as f64 * (1.0 + config.swap_min_gain);
    if !gain_ok {
        debug!(
            "Axis swap rejected: range-valid points {} -> {}",
            valid_before, valid_after
        );
        return false;
    }

    for point in points.iter_mut() {
        std::mem::swap(&mut point.lat, &mut point.lng);
    }
    info!(
        "Corrected axis-swapped coordinates: range-valid points {} -> {}",
        valid_before, valid_after
    );
    true
}

/// Sort by time and drop points whose rounded coordinates were already seen
pub fn dedup_coordinates(mut points: Vec<RawCandidatePoint>) -> Vec<RawCandidatePoint> {
    points.sort_by_key(|p| p.time_offset_ms);

    let mut seen = HashSet::with_capacity(points.len());
    points.retain(|p| {
        let key = (
            (p.lat * DEDUP_SCALE).round() as i64,
            (p.lng * DEDUP_SCALE).round() as i64,
        );
        seen.insert(key)
    });
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Speed-consistent steps under the full step cap
    Strict,
    /// Speed check dropped, tighter step cap
    Relaxed,
}

/// Accept each point only if it is a plausible step from the last accepted one
///
/// The first point is always accepted. Later points are rejected when the time
/// gap exceeds `max_gap_ms` or the distance exceeds the step cap. In strict mode
/// the distance must also fit `max_speed_mps` over the elapsed time plus a GPS
/// noise allowance.
pub fn sequential_filter(
    points: &[RawCandidatePoint],
    mode: FilterMode,
    config: &HeuristicConfig,
) -> Vec<RawCandidatePoint> {
    let step_cap_m = match mode {
        FilterMode::Strict => config.max_step_m,
        FilterMode::Relaxed => config.relaxed_step_m,
    };

    let mut accepted: Vec<RawCandidatePoint> = Vec::with_capacity(points.len());
    for point in points {
        let Some(last) = accepted.last() else {
            accepted.push(point.clone());
            continue;
        };

        let dt_ms = point.time_offset_ms.saturating_sub(last.time_offset_ms);
        if dt_ms > config.max_gap_ms {
            continue;
        }

        let step_m = haversine_distance_m(last.position(), point.position());
        if step_m > step_cap_m {
            continue;
        }

        if mode == FilterMode::Strict {
            let allowed_m = config.max_speed_mps * dt_ms as f64 / 1000.0 + config.gps_noise_m;
            if step_m > allowed_m {
                continue;
            }
        }

        accepted.push(point.clone());
    }
    accepted
}

/// Strict filter with a relaxed rerun when it discards nearly everything
///
/// On sets larger than 50 points where the strict pass throws away more than
/// `relax_discard_ratio`, the relaxed result replaces it only if it keeps at
/// least `relax_min_gain` more points.
pub fn filter_with_relaxation(
    points: &[RawCandidatePoint],
    config: &HeuristicConfig,
) -> Vec<RawCandidatePoint> {
    let strict = sequential_filter(points, FilterMode::Strict, config);

    if points.len() <= LARGE_SET {
        return strict;
    }

    let discarded = 1.0 - strict.len() as f64 / points.len() as f64;
    if discarded <= config.relax_discard_ratio {
        return strict;
    }

    let relaxed = sequential_filter(points, FilterMode::Relaxed, config);
    let relaxed_wins = relaxed.len() > strict.len()
        && relaxed.len() as f64 >= strict.len() as f64 * (1.0 + config.relax_min_gain);

    info!(
        "Strict filter kept {} of {} points, relaxed kept {}; using {}",
        strict.len(),
        points.len(),
        relaxed.len(),
        if relaxed_wins { "relaxed" } else { "strict" }
    );

    if relaxed_wins {
        relaxed
    } else {
        strict
    }
}

/// Drop interior points that are clearly broken spikes
///
/// A point goes only when both legs to its neighbors exceed `outlier_leg_m`
/// and the detour is more than twice the direct hop, i.e. the track jumps away
/// and straight back. If that would remove more than `outlier_max_removed` of
/// the set, the pass is reverted and the input returned unchanged.
pub fn remove_neighbor_outliers(
    points: Vec<RawCandidatePoint>,
    config: &HeuristicConfig,
) -> Vec<RawCandidatePoint> {
    if points.len() <= LARGE_SET {
        return points;
    }

    let last = points.len() - 1;
    let mut kept = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        if i == 0 || i == last {
            kept.push(point.clone());
            continue;
        }

        let prev = points[i - 1].position();
        let next = points[i + 1].position();
        let current = point.position();

        let leg_in = haversine_distance_m(prev, current);
        let leg_out = haversine_distance_m(current, next);
        let direct = haversine_distance_m(prev, next);

        let is_spike = leg_in > config.outlier_leg_m
            && leg_out > config.outlier_leg_m
            && leg_in + leg_out > 2.0 * direct;
        if is_spike {
            debug!(
                "Dropping spike at {} ms: legs {:.0} m / {:.0} m, direct {:.0} m",
                point.time_offset_ms, leg_in, leg_out, direct
            );
        } else {
            kept.push(point.clone());
        }
    }

    let removed = points.len() - kept.len();
    if removed as f64 > config.outlier_max_removed * points.len() as f64 {
        info!(
            "Outlier pass would remove {} of {} points; keeping all",
            removed,
            points.len()
        );
        return points;
    }
    kept
}

/// Run the full validation pipeline over scanner candidates
pub fn validate_candidates(
    mut candidates: Vec<RawCandidatePoint>,
    config: &HeuristicConfig,
) -> Vec<RawCandidatePoint> {
    let total = candidates.len();
    correct_axis_swap(&mut candidates, config);

    candidates.retain(|p| is_range_valid(p.lat, p.lng));
    let in_range = candidates.len();

    let deduped = dedup_coordinates(candidates);
    let unique = deduped.len();

    let filtered = filter_with_relaxation(&deduped, config);
    let filtered_len = filtered.len();

    let result = remove_neighbor_outliers(filtered, config);

    info!(
        "Heuristic validation: {} candidates, {} in range, {} unique, {} plausible, {} kept",
        total,
        in_range,
        unique,
        filtered_len,
        result.len()
    );
    result
}
