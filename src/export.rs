//! Export functionality for parsed flight logs
//!
//! Three outputs are supported: per-point CSV, a GPX track of the positioned
//! points and a JSON anomaly report. Each writer returns `Ok(None)` and creates
//! no file when there is nothing to write.

use crate::conversion::gpx_timestamp;
use crate::types::{AnomalyRecord, FlightLog};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Export configuration options
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Write data points to `<stem>.csv`
    pub csv: bool,
    /// Write positioned points to `<stem>.gpx`
    pub gpx: bool,
    /// Write warnings and errors to `<stem>.anomalies.json`
    pub anomalies: bool,
    /// Output directory, defaults to the directory of the input file
    pub output_dir: Option<String>,
}

/// Paths of the files an export actually produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub csv_path: Option<PathBuf>,
    pub gpx_path: Option<PathBuf>,
    pub anomalies_path: Option<PathBuf>,
}

impl ExportReport {
    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.csv_path
            .iter()
            .chain(self.gpx_path.iter())
            .chain(self.anomalies_path.iter())
    }
}

/// Compute the `(csv, gpx, anomalies)` output paths for an input file
pub fn compute_export_paths(
    input_path: &Path,
    export_options: &ExportOptions,
) -> (PathBuf, PathBuf, PathBuf) {
    let base_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flight");

    let output_dir = match &export_options.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => input_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    (
        output_dir.join(format!("{base_name}.csv")),
        output_dir.join(format!("{base_name}.gpx")),
        output_dir.join(format!("{base_name}.anomalies.json")),
    )
}

fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn opt_f64(value: Option<f64>, precision: usize) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_default()
}

/// Export data points to CSV
#[cfg(feature = "csv")]
pub fn export_to_csv(
    log: &FlightLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<Option<PathBuf>> {
    if log.data_points.is_empty() {
        debug!("{}: no data points, skipping CSV", log.filename);
        return Ok(None);
    }

    let (csv_path, _, _) = compute_export_paths(input_path, export_options);
    let mut writer = csv::Writer::from_writer(create_output_file(&csv_path)?);

    writer.write_record([
        "time_ms",
        "lat",
        "lng",
        "altitude_m",
        "speed_mps",
        "heading_deg",
        "gimbal_pitch_deg",
        "battery_percent",
        "battery_voltage",
        "battery_current",
        "battery_temperature",
        "satellites",
        "is_photo",
        "photo_filename",
        "is_video",
    ])?;

    for point in &log.data_points {
        writer.write_record([
            point.timestamp_offset_ms.to_string(),
            opt_f64(point.lat, 7),
            opt_f64(point.lng, 7),
            opt_f64(point.altitude_m, 2),
            opt_f64(point.speed_mps, 2),
            opt_f64(point.heading_deg, 1),
            opt_f64(point.gimbal_pitch_deg, 1),
            opt_f64(point.battery.percent, 0),
            opt_f64(point.battery.voltage, 3),
            opt_f64(point.battery.current, 3),
            opt_f64(point.battery.temperature, 1),
            point
                .satellite_count
                .map(|c| c.to_string())
                .unwrap_or_default(),
            u8::from(point.is_photo).to_string(),
            point.photo_filename.clone().unwrap_or_default(),
            u8::from(point.is_video_recording).to_string(),
        ])?;
    }
    writer.flush()?;

    debug!(
        "Exported {} data points to {}",
        log.data_points.len(),
        csv_path.display()
    );
    Ok(Some(csv_path))
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Export positioned data points to a GPX track
pub fn export_to_gpx(
    log: &FlightLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<Option<PathBuf>> {
    let positioned: Vec<_> = log
        .data_points
        .iter()
        .filter_map(|p| p.position().map(|pos| (p, pos)))
        .collect();
    if positioned.is_empty() {
        debug!("{}: no positioned points, skipping GPX", log.filename);
        return Ok(None);
    }

    let (_, gpx_path, _) = compute_export_paths(input_path, export_options);
    let mut writer = create_output_file(&gpx_path)?;

    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        writer,
        r#"<gpx creator="flightlog_parser {}" version="1.1" xmlns="http://www.topografix.com/GPX/1/1">"#,
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(
        writer,
        "<metadata><name>{}</name></metadata>",
        xml_escape(&log.filename)
    )?;
    writeln!(writer, "<trk><trkseg>")?;

    let start = log.metadata.start_time_ms;
    for (point, position) in &positioned {
        write!(
            writer,
            r#"  <trkpt lat="{:.7}" lon="{:.7}">"#,
            position.lat, position.lng
        )?;
        if let Some(altitude) = point.altitude_m.filter(|a| a.is_finite()) {
            write!(writer, "<ele>{altitude:.2}</ele>")?;
        }
        writeln!(
            writer,
            "<time>{}</time></trkpt>",
            gpx_timestamp(start, point.timestamp_offset_ms)
        )?;
    }

    writeln!(writer, "</trkseg></trk>")?;
    writeln!(writer, "</gpx>")?;
    writer.flush()?;

    debug!(
        "Exported {} track points to {}",
        positioned.len(),
        gpx_path.display()
    );
    Ok(Some(gpx_path))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnomalyExport<'a> {
    filename: &'a str,
    parser: &'static str,
    warnings: &'a [AnomalyRecord],
    errors: &'a [AnomalyRecord],
}

/// Export warnings and errors to JSON
pub fn export_anomalies(
    log: &FlightLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<Option<PathBuf>> {
    if log.warnings.is_empty() && log.errors.is_empty() {
        debug!("{}: no anomalies, skipping report", log.filename);
        return Ok(None);
    }

    let (_, _, anomalies_path) = compute_export_paths(input_path, export_options);
    let mut writer = create_output_file(&anomalies_path)?;
    serde_json::to_writer_pretty(
        &mut writer,
        &AnomalyExport {
            filename: &log.filename,
            parser: log.metadata.parser.as_str(),
            warnings: &log.warnings,
            errors: &log.errors,
        },
    )?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(Some(anomalies_path))
}

/// Run every export enabled in `export_options`
pub fn export_flight_log(
    log: &FlightLog,
    input_path: &Path,
    export_options: &ExportOptions,
) -> Result<ExportReport> {
    let mut report = ExportReport::default();

    #[cfg(feature = "csv")]
    if export_options.csv {
        report.csv_path = export_to_csv(log, input_path, export_options)?;
    }
    #[cfg(not(feature = "csv"))]
    if export_options.csv {
        tracing::warn!("CSV export requested but the `csv` feature is disabled");
    }

    if export_options.gpx {
        report.gpx_path = export_to_gpx(log, input_path, export_options)?;
    }
    if export_options.anomalies {
        report.anomalies_path = export_anomalies(log, input_path, export_options)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a&b <c> \"d\""), "a&amp;b &lt;c&gt; &quot;d&quot;");
    }

    #[test]
    fn test_opt_f64_formatting() {
        assert_eq!(opt_f64(Some(1.23456), 2), "1.23");
        assert_eq!(opt_f64(Some(f64::NAN), 2), "");
        assert_eq!(opt_f64(None, 2), "");
    }

    #[test]
    fn test_default_output_dir_is_input_parent() {
        let (csv, gpx, anomalies) =
            compute_export_paths(Path::new("logs/DJIFlightRecord.txt"), &ExportOptions::default());
        assert_eq!(csv, PathBuf::from("logs/DJIFlightRecord.csv"));
        assert_eq!(gpx, PathBuf::from("logs/DJIFlightRecord.gpx"));
        assert_eq!(anomalies, PathBuf::from("logs/DJIFlightRecord.anomalies.json"));

        let (csv, _, _) = compute_export_paths(Path::new("flight.txt"), &ExportOptions::default());
        assert_eq!(csv, PathBuf::from("./flight.csv"));
    }
}
