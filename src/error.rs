//! Error types for flight log reconstruction
//!
//! Every variant of [`ParseError`] is terminal for the current parse attempt.
//! Only [`ParseError::ToolNotFound`] causes the orchestrator to switch strategy.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single parse attempt
#[derive(Debug, Error)]
pub enum ParseError {
    /// The trusted decoder binary could not be located or executed
    #[error("trusted decoder not found: {tool}")]
    ToolNotFound { tool: PathBuf },

    /// The log requires a decoder credential and none was configured
    #[error("decoder credential required{}: {diagnostics}", version_suffix(.format_version))]
    CredentialRequired {
        format_version: Option<u8>,
        diagnostics: String,
    },

    /// The configured decoder credential was rejected
    #[error("decoder credential rejected: {diagnostics}")]
    CredentialInvalid { diagnostics: String },

    /// The decoder exceeded its time budget and was killed
    #[error("decoder timed out after {seconds}s and was killed")]
    SubprocessTimeout { seconds: u64 },

    /// The decoder produced more output than the capture buffer allows
    #[error("decoder output exceeded {limit_bytes} bytes and could not be salvaged")]
    OutputTooLarge { limit_bytes: usize },

    /// The decoder output had a wrong or absent shape
    #[error("malformed decoder output: {0}")]
    MalformedOutput(String),

    /// Frames were present but none carried a usable GPS position
    #[error("none of {frames} decoded frames had a GPS position")]
    NoGpsData { frames: usize },

    /// The heuristic extractor found too few points to trust
    #[error(
        "heuristic extraction found only {found} data points (minimum {required}); \
         results from the undecoded format are likely false positives, \
         install the trusted decoder to parse this log accurately"
    )]
    InsufficientHeuristicData { found: usize, required: usize },

    /// The heuristic extractor produced a location that is not plausible
    #[error(
        "heuristic extraction produced an implausible location ({lat:.5}, {lng:.5}); \
         this format yields garbage coordinates without decoding, \
         install the trusted decoder to parse this log accurately"
    )]
    ImplausibleCoordinates { lat: f64, lng: f64 },

    /// The decoder failed for a reason not covered by another variant
    #[error("decoder failed (exit status {}): {diagnostics}", status_text(.status))]
    DecoderFailed {
        status: Option<i32>,
        diagnostics: String,
    },

    /// Temporary file or directory operations failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`ParseError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    ToolNotFound,
    CredentialRequired,
    CredentialInvalid,
    SubprocessTimeout,
    OutputTooLarge,
    MalformedOutput,
    NoGpsData,
    InsufficientHeuristicData,
    ImplausibleCoordinates,
    DecoderFailed,
    Io,
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::ToolNotFound { .. } => ParseErrorKind::ToolNotFound,
            ParseError::CredentialRequired { .. } => ParseErrorKind::CredentialRequired,
            ParseError::CredentialInvalid { .. } => ParseErrorKind::CredentialInvalid,
            ParseError::SubprocessTimeout { .. } => ParseErrorKind::SubprocessTimeout,
            ParseError::OutputTooLarge { .. } => ParseErrorKind::OutputTooLarge,
            ParseError::MalformedOutput(_) => ParseErrorKind::MalformedOutput,
            ParseError::NoGpsData { .. } => ParseErrorKind::NoGpsData,
            ParseError::InsufficientHeuristicData { .. } => {
                ParseErrorKind::InsufficientHeuristicData
            }
            ParseError::ImplausibleCoordinates { .. } => ParseErrorKind::ImplausibleCoordinates,
            ParseError::DecoderFailed { .. } => ParseErrorKind::DecoderFailed,
            ParseError::Io(_) => ParseErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::MalformedOutput(err.to_string())
    }
}

fn version_suffix(version: &Option<u8>) -> String {
    version
        .map(|v| format!(" for log format version {v}"))
        .unwrap_or_default()
}

fn status_text(status: &Option<i32>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Outcome of one parse attempt, `Ok` on success
pub type ParseResult = Result<crate::types::FlightLog>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_required_message_names_version() {
        let err = ParseError::CredentialRequired {
            format_version: Some(14),
            diagnostics: "API key required".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("version 14"));
        assert!(msg.contains("API key required"));
        assert_eq!(err.kind(), ParseErrorKind::CredentialRequired);
    }

    #[test]
    fn test_heuristic_messages_name_the_decoder() {
        let err = ParseError::InsufficientHeuristicData {
            found: 5,
            required: 10,
        };
        assert!(err.to_string().contains("trusted decoder"));

        let err = ParseError::ImplausibleCoordinates {
            lat: 89.0,
            lng: 0.0,
        };
        assert!(err.to_string().contains("trusted decoder"));
    }

    #[test]
    fn test_decoder_failed_without_status() {
        let err = ParseError::DecoderFailed {
            status: None,
            diagnostics: "killed".to_string(),
        };
        assert!(err.to_string().contains("signal"));
    }
}
