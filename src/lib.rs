//! Flight Log Parser Library
//!
//! Reconstructs telemetry from consumer drone flight logs into a single
//! canonical [`FlightLog`]. A trusted external decoder is tried first and its
//! JSON output normalized; when the decoder binary is not installed, a
//! heuristic binary scan recovers a GPS track instead.
//!
//! # Features
//!
//! - **`csv`** (default): Enable CSV export functionality
//! - **`cli`** (default): Build the command-line interface binary
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flightlog_parser::{parse_flight_log_file, ParserConfig};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ParserConfig::from_env()?;
//! let log = parse_flight_log_file(Path::new("DJIFlightRecord_2024-05-01.txt"), &config).await?;
//! println!("{} points over {:.0}s", log.data_points.len(), log.duration_seconds);
//! # Ok(())
//! # }
//! ```
//!
//! Export to GPX and CSV:
//! ```rust,no_run
//! use flightlog_parser::{export_flight_log, ExportOptions, FlightLog};
//! use std::path::Path;
//!
//! # fn run(log: &FlightLog) -> anyhow::Result<()> {
//! let options = ExportOptions {
//!     csv: true,
//!     gpx: true,
//!     anomalies: false,
//!     output_dir: None,
//! };
//! let report = export_flight_log(log, Path::new("flight.txt"), &options)?;
//! for path in report.written() {
//!     println!("Exported to: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Public API
//!
//! ## Parsing Functions
//! - [`parse_flight_log_file`] - Parse a log file from disk
//! - [`parse_flight_log`] - Parse a log held in memory
//! - [`parse_heuristic`] - Run only the heuristic extractor and its gates
//! - [`normalize_decoder_output`] - Normalize decoder JSON that is already captured
//!
//! ## Export Functions
//! - [`export_flight_log`] - Run every enabled export
//! - [`export_to_gpx`] - Export positioned points to GPX
//! - [`export_anomalies`] - Export warnings and errors to JSON
//! - [`compute_export_paths`] - Helper for consistent path computation

pub mod config;
pub mod conversion;
pub mod error;
pub mod export;
pub mod filters;
pub mod geo;
pub mod parser;
pub mod stats;
pub mod types;

pub use config::{DecoderConfig, HeuristicConfig, NormalizerConfig, ParserConfig};
pub use error::{ConfigError, ParseError, ParseErrorKind, ParseResult};
#[cfg(feature = "csv")]
pub use export::export_to_csv;
pub use export::{
    compute_export_paths, export_anomalies, export_flight_log, export_to_gpx, ExportOptions,
    ExportReport,
};
pub use parser::{normalize_decoder_output, parse_flight_log, parse_flight_log_file, parse_heuristic};
pub use stats::resolve_duration;
pub use types::*;
