use serde::{Deserialize, Serialize};

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when the point is inside the WGS84 range and away from null island
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
            && !(self.lat.abs() < 1e-6 && self.lng.abs() < 1e-6)
    }
}

/// Coordinate candidate found by the heuristic scanner, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidatePoint {
    pub time_offset_ms: u64,
    pub lat: f64,
    pub lng: f64,
    pub altitude_m: Option<f64>,
}

impl RawCandidatePoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}
