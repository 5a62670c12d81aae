use crate::types::BatteryReading;

/// One telemetry sample from the trusted decoder, flattened
///
/// The decoder emits nested `osd`/`camera`/`gimbal`/`battery`/`rc` blocks, point
/// feature properties or bare line vertices depending on the output shape. Each
/// shape has its own mapping function in `parser::shapes` that fills this struct,
/// so the normalizer never looks into nested maps itself.
#[derive(Debug, Clone, Default)]
pub struct DecodedFrame {
    /// Timestamp in milliseconds as carried by the source, never synthesized
    pub timestamp_ms: Option<i64>,
    /// Decoder-reported elapsed flight time in seconds
    pub fly_time_s: Option<f64>,

    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Height above takeoff when the source has one, else absolute altitude
    pub altitude_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub gimbal_pitch_deg: Option<f64>,
    pub satellite_count: Option<u32>,
    /// Whether the decoder marked the GPS fix as in use
    pub gps_used: Option<bool>,

    pub battery: BatteryReading,

    // Camera
    pub is_photo: Option<bool>,
    pub is_video: Option<bool>,
    pub photo_count: Option<u32>,

    // Fault and link signals
    pub voltage_warning: Option<i64>,
    pub gimbal_stuck: Option<bool>,
    pub uplink_signal: Option<i64>,
    pub downlink_signal: Option<i64>,
    pub compass_error: Option<bool>,
    pub imu_init_fail_reason: Option<String>,
    pub motor_blocked: Option<bool>,
    pub motor_start_failed_cause: Option<String>,
    pub barometer_dead_in_air: Option<bool>,
    pub app_warning: Option<String>,

    // Identity carried by recovery blocks
    pub product_type: Option<String>,
    pub aircraft_name: Option<String>,
    pub aircraft_sn: Option<String>,
    pub battery_sn: Option<String>,

    /// Source fields as received, kept for debugging
    pub raw: Option<serde_json::Value>,
}

impl DecodedFrame {
    /// Position if both coordinates are present
    pub fn position(&self) -> Option<crate::types::GeoPoint> {
        Some(crate::types::GeoPoint::new(self.lat?, self.lng?))
    }
}
