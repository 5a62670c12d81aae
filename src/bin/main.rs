//! CLI binary for the flight log parser
//!
//! This provides the command-line interface for the flightlog_parser library.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use flightlog_parser::{
    export_flight_log, parse_flight_log_file, ExportOptions, FlightLog, ParseError, ParserConfig,
};
use glob::glob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn version() -> String {
    match option_env!("VERGEN_GIT_SHA") {
        Some(sha) => format!("{} ({})", env!("CARGO_PKG_VERSION"), sha),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Expand file arguments, globbing any that contain wildcards
fn collect_paths(file_patterns: &[&String]) -> Vec<PathBuf> {
    let mut valid_paths = Vec::new();
    for pattern in file_patterns {
        let paths: Vec<_> = if pattern.contains('*') || pattern.contains('?') {
            match glob(pattern) {
                Ok(glob_iter) => match glob_iter.collect::<Result<Vec<_>, _>>() {
                    Ok(paths) => {
                        debug!("Glob pattern '{pattern}' matched {} files", paths.len());
                        paths
                    }
                    Err(e) => {
                        warn!("Error expanding glob pattern '{pattern}': {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Invalid glob pattern '{pattern}': {e}");
                    continue;
                }
            }
        } else {
            vec![Path::new(pattern).to_path_buf()]
        };

        for path in paths {
            if !path.is_file() {
                warn!("File does not exist: {}", path.display());
                continue;
            }
            valid_paths.push(path);
        }
    }
    valid_paths
}

fn print_summary(log: &FlightLog) {
    println!("  Parser:        {}", log.metadata.parser.as_str());
    if let Some(model) = &log.drone_model {
        println!("  Aircraft:      {model}");
    }
    if let Some(date) = log.flight_date {
        println!("  Date:          {date}");
    }
    println!("  Duration:      {:.1}s", log.duration_seconds);
    println!(
        "  Points:        {} ({} with GPS)",
        log.data_points.len(),
        log.gps_point_count()
    );
    println!("  Max altitude:  {:.1} m", log.max_altitude_m);
    println!("  Max speed:     {:.1} m/s", log.max_speed_mps);
    println!("  Max distance:  {:.0} m", log.max_distance_m);
    println!("  Total path:    {:.0} m", log.total_distance_m);
    if let (Some(start), Some(end)) = (log.battery_start_percent, log.battery_end_percent) {
        println!("  Battery:       {start:.0}% -> {end:.0}%");
    }
    if log.photo_count() > 0 {
        println!("  Photos:        {}", log.photo_count());
    }
    println!(
        "  Anomalies:     {} warnings, {} errors",
        log.warnings.len(),
        log.errors.len()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Flight Log Parser")
        .version(version())
        .about("Reconstruct telemetry from drone flight logs. Output to various formats.")
        .arg(
            Arg::new("files")
                .help("Flight log files to parse (supports globbing)")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug output and detailed parsing information")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML configuration file (environment variables still override it)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .help("Export data points to <name>.csv")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("gpx")
                .long("gpx")
                .help("Export the GPS track to <name>.gpx")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("anomalies")
                .long("anomalies")
                .help("Export warnings and errors to <name>.anomalies.json")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .help("Directory for output files (default: same as input file)")
                .value_name("DIR"),
        )
        .get_matches();

    let debug = matches.get_flag("debug");
    init_tracing(debug);

    let config = match matches.get_one::<String>("config") {
        Some(path) => ParserConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => ParserConfig::from_env().context("Invalid environment configuration")?,
    };
    debug!("Using decoder {}", config.decoder.path.display());

    let export_options = ExportOptions {
        csv: matches.get_flag("csv"),
        gpx: matches.get_flag("gpx"),
        anomalies: matches.get_flag("anomalies"),
        output_dir: matches.get_one::<String>("output-dir").cloned(),
    };

    let file_patterns: Vec<&String> = matches
        .get_many::<String>("files")
        .map(|values| values.collect())
        .unwrap_or_default();
    let valid_paths = collect_paths(&file_patterns);

    if valid_paths.is_empty() {
        error!("No valid files found to process. Input patterns were: {file_patterns:?}");
        std::process::exit(1);
    }
    debug!("Found {} files to process", valid_paths.len());

    let config = Arc::new(config);
    let mut tasks = JoinSet::new();
    for (index, path) in valid_paths.into_iter().enumerate() {
        let config = Arc::clone(&config);
        tasks.spawn(async move {
            let result = parse_flight_log_file(&path, &config).await;
            (index, path, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("Parse task panicked")?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let total = results.len();
    let mut processed_files = 0;
    for (index, path, result) in results {
        if index > 0 {
            println!();
        }
        println!("Processing: {}", path.display());

        match result {
            Ok(log) => {
                print_summary(&log);
                match export_flight_log(&log, &path, &export_options) {
                    Ok(report) => {
                        for written in report.written() {
                            info!("Exported {}", written.display());
                        }
                    }
                    Err(e) => error!("Export failed for {}: {e:#}", path.display()),
                }
                processed_files += 1;
            }
            Err(e @ ParseError::CredentialRequired { .. }) => {
                error!("{}: {e}", path.display());
                error!("Set FLIGHTLOG_DECODER_CREDENTIAL or the decoder.credential config value");
            }
            Err(e) => {
                error!("{}: {e}", path.display());
            }
        }
    }

    if processed_files == 0 {
        error!("No files were successfully processed out of {total} files found.");
        std::process::exit(1);
    }

    Ok(())
}
