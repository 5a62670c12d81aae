//! Integration tests for export functionality
//!
//! Tests the export layer across different scenarios:
//! - GPX export with directory creation
//! - Anomaly export in JSON format
//! - Output directory defaulting to input parent
//! - Empty inputs producing no files

use flightlog_parser::export::*;
use flightlog_parser::{
    AnomalyRecord, FlightLog, FlightLogDataPoint, FlightMetadata, ParserKind, Severity,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_log(points: Vec<FlightLogDataPoint>) -> FlightLog {
    let mut metadata = FlightMetadata::new(ParserKind::TrustedDecoder);
    metadata.start_time_ms = Some(1_714_558_830_000);
    FlightLog {
        filename: "test.txt".to_string(),
        flight_date: None,
        drone_model: None,
        duration_seconds: 0.0,
        max_altitude_m: 0.0,
        max_speed_mps: 0.0,
        max_distance_m: 0.0,
        total_distance_m: 0.0,
        home_location: None,
        start_location: None,
        end_location: None,
        battery_start_percent: None,
        battery_end_percent: None,
        warnings: Vec::new(),
        errors: Vec::new(),
        data_points: points,
        metadata,
    }
}

fn positioned(offset_ms: u32, lat: f64, lng: f64) -> FlightLogDataPoint {
    FlightLogDataPoint {
        timestamp_offset_ms: offset_ms,
        lat: Some(lat),
        lng: Some(lng),
        altitude_m: Some(12.5),
        ..Default::default()
    }
}

fn options_in(dir: &std::path::Path) -> ExportOptions {
    ExportOptions {
        csv: false,
        gpx: false,
        anomalies: false,
        output_dir: Some(dir.to_str().unwrap().to_string()),
    }
}

#[test]
fn test_export_gpx_creates_output_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let nonexistent_dir = temp_dir.path().join("nonexistent").join("output");
    let input_path = temp_dir.path().join("test.txt");

    let log = sample_log(vec![
        positioned(0, 40.7129, -74.0061),
        FlightLogDataPoint {
            timestamp_offset_ms: 500,
            ..Default::default()
        },
        positioned(1000, 40.7130, -74.0062),
    ]);

    let export_opts = ExportOptions {
        gpx: true,
        ..options_in(&nonexistent_dir)
    };
    let result = export_to_gpx(&log, &input_path, &export_opts);
    assert!(
        result.is_ok(),
        "GPX export should succeed and create directories"
    );
    assert!(
        nonexistent_dir.exists(),
        "Output directory should be created"
    );

    let gpx_path = nonexistent_dir.join("test.gpx");
    assert_eq!(result.unwrap(), Some(gpx_path.clone()));

    let content = fs::read_to_string(&gpx_path).expect("Failed to read GPX file");
    assert!(content.starts_with("<?xml"));
    assert_eq!(
        content.matches("<trkpt").count(),
        2,
        "Points without a position are skipped"
    );
    assert!(content.contains(r#"lat="40.7129000" lon="-74.0061000""#));
    assert!(content.contains("<ele>12.50</ele>"));
    assert!(content.contains("<time>2024-05-01T10:20:31.000Z</time></trkpt>"));
}

#[test]
fn test_gpx_without_positions_writes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input_path = temp_dir.path().join("test.txt");
    let log = sample_log(vec![FlightLogDataPoint::default()]);

    let result = export_to_gpx(&log, &input_path, &options_in(temp_dir.path()));
    assert_eq!(result.unwrap(), None);
    assert!(!temp_dir.path().join("test.gpx").exists());
}

#[test]
fn test_export_anomalies_writes_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output_dir = temp_dir.path().join("anomaly_out");
    let input_path = temp_dir.path().join("test.txt");

    let mut log = sample_log(vec![positioned(0, 37.0, -122.0)]);
    log.warnings.push(AnomalyRecord {
        severity: Severity::Warning,
        category: "battery".to_string(),
        message: "Battery low: 15%".to_string(),
        timestamp_offset_ms: 0,
        details: json!({ "percent": 15.0 }),
    });
    log.errors.push(AnomalyRecord {
        severity: Severity::Error,
        category: "compass".to_string(),
        message: "Compass error".to_string(),
        timestamp_offset_ms: 2000,
        details: json!({}),
    });

    let path = export_anomalies(&log, &input_path, &options_in(&output_dir))
        .expect("Anomaly export should succeed")
        .expect("Anomaly file should be written");
    assert_eq!(path, output_dir.join("test.anomalies.json"));

    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(content["parser"], "trusted-decoder");
    assert_eq!(content["warnings"][0]["category"], "battery");
    assert_eq!(content["errors"][0]["timestampOffsetMs"], 2000);
}

#[test]
fn test_export_anomalies_empty_returns_ok() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input_path = temp_dir.path().join("test.txt");
    let log = sample_log(vec![positioned(0, 37.0, -122.0)]);

    let result = export_anomalies(&log, &input_path, &options_in(temp_dir.path()));
    assert_eq!(result.unwrap(), None);
    assert!(
        !temp_dir.path().join("test.anomalies.json").exists(),
        "No anomaly file should be created for a clean flight"
    );
}

#[cfg(feature = "csv")]
#[test]
fn test_csv_has_one_row_per_point() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input_path = temp_dir.path().join("test.txt");
    let mut points = vec![positioned(0, 37.0, -122.0), positioned(1000, 37.0001, -122.0)];
    points[1].is_photo = true;
    points[1].photo_filename = Some("DJI_20240501102031_0001_D.DNG".to_string());
    let log = sample_log(points);

    let path = export_to_csv(&log, &input_path, &options_in(temp_dir.path()))
        .unwrap()
        .unwrap();
    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("time_ms,lat,lng"));
    let fields = lines[0].split(',').count();
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), fields, "Row width must match header");
    }
    assert!(lines[2].contains("DJI_20240501102031_0001_D.DNG"));
}

#[test]
fn test_compute_export_paths_with_output_dir() {
    let export_opts = ExportOptions {
        output_dir: Some("/tmp/out".to_string()),
        ..Default::default()
    };
    let (csv, gpx, anomalies) =
        compute_export_paths(&PathBuf::from("/logs/test.txt"), &export_opts);

    assert_eq!(csv, PathBuf::from("/tmp/out/test.csv"));
    assert_eq!(gpx, PathBuf::from("/tmp/out/test.gpx"));
    assert_eq!(anomalies, PathBuf::from("/tmp/out/test.anomalies.json"));
}

#[test]
fn test_compute_export_paths_defaults_to_input_parent() {
    let (csv, _, _) = compute_export_paths(&PathBuf::from("/logs/test.txt"), &ExportOptions::default());
    assert_eq!(csv, PathBuf::from("/logs/test.csv"));
}

#[test]
fn test_export_options_defaults() {
    let opts = ExportOptions::default();
    assert!(!opts.csv);
    assert!(!opts.gpx);
    assert!(!opts.anomalies);
    assert!(opts.output_dir.is_none());
}

#[test]
fn test_export_flight_log_only_runs_enabled_exports() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input_path = temp_dir.path().join("test.txt");
    let log = sample_log(vec![positioned(0, 37.0, -122.0)]);

    let export_opts = ExportOptions {
        gpx: true,
        anomalies: true,
        ..options_in(temp_dir.path())
    };
    let report = export_flight_log(&log, &input_path, &export_opts).unwrap();

    assert_eq!(report.gpx_path, Some(temp_dir.path().join("test.gpx")));
    assert_eq!(report.csv_path, None);
    assert_eq!(report.anomalies_path, None);
    assert_eq!(report.written().count(), 1);
}
