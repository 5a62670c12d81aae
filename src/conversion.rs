//! Data conversion utilities
//!
//! Unit normalization for timestamps and offsets, flight date recovery from
//! content or filenames, and photo filename reconstruction.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Largest offset a data point may carry
pub const MAX_OFFSET_MS: i64 = i32::MAX as i64;

/// Years accepted when deriving a flight date from log content
pub const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 2010..=2035;

/// Normalize a numeric timestamp to milliseconds
///
/// Values below 10^10 are taken as seconds. Anything larger is already at
/// millisecond (or finer) resolution and is passed through.
pub fn normalize_timestamp_ms(value: f64) -> Option<i64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value < 1e10 {
        // seconds
        Some((value * 1000.0).round() as i64)
    } else {
        // milliseconds below 10^12, finer-grained values are kept as they are
        Some(value.round() as i64)
    }
}

/// Clamp a millisecond offset into the `[0, i32::MAX]` range of data points
pub fn clamp_offset_ms(offset_ms: i64) -> u32 {
    offset_ms.clamp(0, MAX_OFFSET_MS) as u32
}

/// Parse a decoder date-time string into epoch milliseconds
///
/// Accepts RFC 3339 (`2024-05-01T10:20:30.123Z`) and naive UTC forms
/// (`2024-05-01 10:20:30.123`, `2024-05-01T10:20:30`).
pub fn parse_datetime_ms(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// Calendar date of an epoch timestamp, if its year is plausible for a flight
pub fn date_from_epoch_ms(epoch_ms: i64) -> Option<NaiveDate> {
    let dt = Utc.timestamp_millis_opt(epoch_ms).single()?;
    PLAUSIBLE_YEARS
        .contains(&dt.year())
        .then(|| dt.date_naive())
}

fn filename_date_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|_)(\d{4})-(\d{2})-(\d{2})(?:_(\d{2})-(\d{2})-(\d{2}))?").ok()
    })
    .as_ref()
}

/// Flight date embedded in a log filename
///
/// Matches names like `DJIFlightRecord_2024-05-01_[10-20-30].txt`, where the
/// bracketed time of day is optional.
pub fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    // Brackets around the time are common, drop them so one pattern covers both
    let cleaned: String = filename.chars().filter(|c| *c != '[' && *c != ']').collect();
    let caps = filename_date_regex()?.captures(&cleaned)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Reconstruct the camera filename of a photo taken at `epoch_ms`
///
/// The camera names raw captures `DJI_<yyyymmddhhmmss>_<index>_D.DNG`, the index
/// being a four digit counter.
pub fn photo_filename(epoch_ms: i64, index: u32) -> Option<String> {
    let dt = Utc.timestamp_millis_opt(epoch_ms).single()?;
    Some(format!(
        "DJI_{}_{:04}_D.DNG",
        dt.format("%Y%m%d%H%M%S"),
        index % 10_000
    ))
}

/// ISO 8601 timestamp for GPX output
///
/// With a known flight start the result is absolute; otherwise the offset is
/// rendered relative to the Unix epoch, which GPX readers still order correctly.
pub fn gpx_timestamp(start_epoch_ms: Option<i64>, offset_ms: u32) -> String {
    let epoch_ms = start_epoch_ms.unwrap_or(0) + offset_ms as i64;
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "1970-01-01T00:00:00.000Z".to_string())
}
