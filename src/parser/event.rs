//! Anomaly detection over decoded frames
//!
//! Each frame is checked against battery thresholds and decoder fault flags.
//! Conditions that persist across many frames are collapsed: a given
//! `(category, key)` pair is recorded at most once per dedup window.

use crate::types::{AnomalyRecord, DecodedFrame, Severity};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Battery percentage below which a warning is raised
pub const BATTERY_WARNING_PERCENT: f64 = 20.0;
/// Battery percentage below which an error is raised
pub const BATTERY_ERROR_PERCENT: f64 = 10.0;
/// Satellite counts below this (but above zero) are a weak fix
pub const MIN_SATELLITES: u32 = 6;

/// IMU init reasons the decoder reports during normal startup
const BENIGN_IMU_REASONS: [&str; 6] = [
    "None",
    "Unknown",
    "CollectingData",
    "WaitingMcStationary",
    "MonitorError",
    "0",
];

/// Motor start causes that mean nothing failed
const BENIGN_MOTOR_CAUSES: [&str; 2] = ["None", "0"];

/// Warnings and errors found in one log, each in time order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyReport {
    pub warnings: Vec<AnomalyRecord>,
    pub errors: Vec<AnomalyRecord>,
}

/// Per-log anomaly detector with time-windowed dedup
///
/// Frames must be observed in non-decreasing offset order.
#[derive(Debug)]
pub struct AnomalyDetector {
    window_ms: u64,
    last_seen: HashMap<(&'static str, String), u32>,
    report: AnomalyReport,
}

impl AnomalyDetector {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_seen: HashMap::new(),
            report: AnomalyReport::default(),
        }
    }

    /// Check one frame at `offset_ms`
    pub fn observe(&mut self, offset_ms: u32, frame: &DecodedFrame) {
        if let Some(percent) = frame.battery.percent.filter(|p| p.is_finite()) {
            if percent < BATTERY_ERROR_PERCENT {
                self.record(
                    Severity::Error,
                    "battery",
                    "error".to_string(),
                    offset_ms,
                    format!("Battery critically low: {percent:.0}%"),
                    json!({ "percent": percent }),
                );
            } else if percent < BATTERY_WARNING_PERCENT {
                self.record(
                    Severity::Warning,
                    "battery",
                    "warning".to_string(),
                    offset_ms,
                    format!("Battery low: {percent:.0}%"),
                    json!({ "percent": percent }),
                );
            }
        }

        if let Some(level) = frame.voltage_warning.filter(|v| *v != 0) {
            self.record(
                Severity::Warning,
                "voltage",
                level.to_string(),
                offset_ms,
                format!("Battery voltage warning (level {level})"),
                json!({ "level": level }),
            );
        }

        if frame.gimbal_stuck == Some(true) {
            self.record(
                Severity::Warning,
                "gimbal",
                "stuck".to_string(),
                offset_ms,
                "Gimbal stuck".to_string(),
                json!({}),
            );
        }

        for (link, signal) in [
            ("uplink", frame.uplink_signal),
            ("downlink", frame.downlink_signal),
        ] {
            if signal == Some(0) {
                self.record(
                    Severity::Warning,
                    "signal",
                    link.to_string(),
                    offset_ms,
                    format!("Remote controller {link} signal lost"),
                    json!({ "link": link }),
                );
            }
        }

        if frame.compass_error == Some(true) {
            self.record(
                Severity::Error,
                "compass",
                "error".to_string(),
                offset_ms,
                "Compass error".to_string(),
                json!({}),
            );
        }

        if let Some(reason) = frame
            .imu_init_fail_reason
            .as_deref()
            .filter(|r| !BENIGN_IMU_REASONS.contains(r))
        {
            self.record(
                Severity::Error,
                "imu",
                reason.to_string(),
                offset_ms,
                format!("IMU initialization failed: {reason}"),
                json!({ "reason": reason }),
            );
        }

        if frame.motor_blocked == Some(true) {
            self.record(
                Severity::Error,
                "motor",
                "blocked".to_string(),
                offset_ms,
                "Motor blocked".to_string(),
                json!({}),
            );
        }
        if let Some(cause) = frame
            .motor_start_failed_cause
            .as_deref()
            .filter(|c| !BENIGN_MOTOR_CAUSES.contains(c))
        {
            self.record(
                Severity::Error,
                "motor",
                cause.to_string(),
                offset_ms,
                format!("Motor start failed: {cause}"),
                json!({ "cause": cause }),
            );
        }

        if let Some(count) = frame
            .satellite_count
            .filter(|c| *c > 0 && *c < MIN_SATELLITES)
        {
            self.record(
                Severity::Warning,
                "gps",
                "low_satellites".to_string(),
                offset_ms,
                format!("Weak GPS fix: {count} satellites"),
                json!({ "satellites": count }),
            );
        }

        if frame.barometer_dead_in_air == Some(true) {
            self.record(
                Severity::Error,
                "barometer",
                "dead_in_air".to_string(),
                offset_ms,
                "Barometer failed in flight".to_string(),
                json!({}),
            );
        }

        if let Some(message) = frame.app_warning.as_deref() {
            self.record(
                Severity::Warning,
                "app",
                message.to_string(),
                offset_ms,
                message.to_string(),
                json!({}),
            );
        }
    }

    fn record(
        &mut self,
        severity: Severity,
        category: &'static str,
        key: String,
        offset_ms: u32,
        message: String,
        details: serde_json::Value,
    ) {
        let slot = (category, key);
        if let Some(last) = self.last_seen.get(&slot) {
            if u64::from(offset_ms.saturating_sub(*last)) < self.window_ms {
                return;
            }
        }
        debug!("{:?} [{}] at {} ms: {}", severity, category, offset_ms, message);
        self.last_seen.insert(slot, offset_ms);

        let record = AnomalyRecord {
            severity,
            category: category.to_string(),
            message,
            timestamp_offset_ms: offset_ms,
            details,
        };
        match severity {
            Severity::Warning => self.report.warnings.push(record),
            Severity::Error => self.report.errors.push(record),
        }
    }

    pub fn finish(self) -> AnomalyReport {
        self.report
    }
}

/// Run the detector over `(offset, frame)` pairs in time order
pub fn detect_anomalies<'a, I>(frames: I, window_ms: u64) -> AnomalyReport
where
    I: IntoIterator<Item = (u32, &'a DecodedFrame)>,
{
    let mut detector = AnomalyDetector::new(window_ms);
    for (offset_ms, frame) in frames {
        detector.observe(offset_ms, frame);
    }
    detector.finish()
}
