//! Quality gates for heuristic extraction results
//!
//! The heuristic extractor never fails on its own; these gates decide whether
//! what it found is trustworthy enough to hand out. Both produce errors that
//! point the operator at the trusted decoder as the fix.

use crate::error::{ParseError, Result};
use crate::types::{FlightLogDataPoint, GeoPoint};
use tracing::{info, warn};

/// Latitudes beyond this are treated as scan noise
pub const MAX_PLAUSIBLE_LATITUDE: f64 = 75.0;

/// Radius around null island, in degrees, rejected as noise
pub const NULL_ISLAND_RADIUS_DEG: f64 = 1.0;

/// Open-ocean regions where decoding garbage tends to land
///
/// Each entry is `(name, lat range, lng range)`.
const OPEN_OCEAN_BOXES: [(&str, (f64, f64), (f64, f64)); 2] = [
    ("South Pacific", (-60.0, -5.0), (-140.0, -90.0)),
    ("South Atlantic", (-55.0, -5.0), (-30.0, -15.0)),
];

/// Require at least `min_points` heuristic data points, and never fewer than one
///
/// Fewer points than this almost always means the scanner matched random
/// bytes of the undecoded format rather than real GPS records.
pub fn check_min_points(points: &[FlightLogDataPoint], min_points: usize) -> Result<()> {
    let required = min_points.max(1);
    if points.len() < required {
        warn!(
            "Heuristic extraction found {} points, below the minimum of {}",
            points.len(),
            required
        );
        return Err(ParseError::InsufficientHeuristicData {
            found: points.len(),
            required,
        });
    }
    Ok(())
}

/// Reason a location is implausible, if it is
pub fn implausible_location_reason(point: GeoPoint) -> Option<String> {
    if !point.is_valid() {
        return Some("outside the valid coordinate range".to_string());
    }
    if point.lat.abs() > MAX_PLAUSIBLE_LATITUDE {
        return Some(format!("latitude beyond ±{MAX_PLAUSIBLE_LATITUDE}°"));
    }
    if point.lat.abs() < NULL_ISLAND_RADIUS_DEG && point.lng.abs() < NULL_ISLAND_RADIUS_DEG {
        return Some("next to null island".to_string());
    }
    OPEN_OCEAN_BOXES
        .iter()
        .find(|(_, (lat_min, lat_max), (lng_min, lng_max))| {
            (*lat_min..=*lat_max).contains(&point.lat) && (*lng_min..=*lng_max).contains(&point.lng)
        })
        .map(|(name, _, _)| format!("in the open {name}"))
}

/// Reject a track whose first point is in an implausible location
pub fn check_plausible_location(points: &[FlightLogDataPoint]) -> Result<()> {
    let Some(first) = points.first() else {
        return Ok(());
    };
    let (lat, lng) = (first.lat.unwrap_or(f64::NAN), first.lng.unwrap_or(f64::NAN));

    if let Some(reason) = implausible_location_reason(GeoPoint::new(lat, lng)) {
        warn!(
            "Heuristic start location {:.5},{:.5} rejected: {}",
            lat, lng, reason
        );
        return Err(ParseError::ImplausibleCoordinates { lat, lng });
    }
    Ok(())
}

/// Apply both gates in order
pub fn check_heuristic_quality(points: &[FlightLogDataPoint], min_points: usize) -> Result<()> {
    check_min_points(points, min_points)?;
    check_plausible_location(points)?;
    info!("Heuristic result passed quality gates with {} points", points.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    fn points_at(lat: f64, lng: f64, count: usize) -> Vec<FlightLogDataPoint> {
        (0..count)
            .map(|i| FlightLogDataPoint {
                timestamp_offset_ms: i as u32 * 100,
                lat: Some(lat + i as f64 * 1e-5),
                lng: Some(lng),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_minimum_point_gate() {
        let err = check_heuristic_quality(&points_at(37.0, -122.0, 5), 10).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InsufficientHeuristicData);
        assert!(err.to_string().contains("trusted decoder"));

        assert!(check_heuristic_quality(&points_at(37.0, -122.0, 15), 10).is_ok());
    }

    #[test]
    fn test_plausibility_gate() {
        for (lat, lng) in [(80.0, 10.0), (0.5, -0.5), (-30.0, -120.0), (-20.0, -25.0)] {
            let err = check_plausible_location(&points_at(lat, lng, 15)).unwrap_err();
            assert_eq!(err.kind(), ParseErrorKind::ImplausibleCoordinates, "{lat},{lng}");
        }
        for (lat, lng) in [(37.0, -122.0), (-33.9, 151.2), (51.5, -0.1), (-23.5, -46.6)] {
            assert!(check_plausible_location(&points_at(lat, lng, 15)).is_ok(), "{lat},{lng}");
        }
    }

    #[test]
    fn test_empty_track_fails_even_without_minimum() {
        let err = check_heuristic_quality(&[], 0).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientHeuristicData {
                found: 0,
                required: 1
            }
        ));
        assert!(check_heuristic_quality(&points_at(37.0, -122.0, 1), 0).is_ok());
    }

    #[test]
    fn test_plausibility_of_empty_track() {
        assert!(check_plausible_location(&[]).is_ok());
    }
}
