//! Parser configuration
//!
//! Settings come from built-in defaults, an optional TOML file and then
//! `FLIGHTLOG_*` environment variables, in that order of precedence.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DECODER_PATH: &str = "FLIGHTLOG_DECODER_PATH";
pub const ENV_DECODER_CREDENTIAL: &str = "FLIGHTLOG_DECODER_CREDENTIAL";
pub const ENV_DECODER_TIMEOUT_SECS: &str = "FLIGHTLOG_DECODER_TIMEOUT_SECS";
pub const ENV_HEURISTIC_STRIDE: &str = "FLIGHTLOG_HEURISTIC_STRIDE";
pub const ENV_MIN_HEURISTIC_POINTS: &str = "FLIGHTLOG_MIN_HEURISTIC_POINTS";
pub const ENV_ANOMALY_WINDOW_MS: &str = "FLIGHTLOG_ANOMALY_WINDOW_MS";

/// Top-level parser configuration
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct ParserConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub heuristic: HeuristicConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

/// Trusted decoder subprocess settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Decoder binary, looked up on `PATH` when not absolute
    #[serde(default = "default_decoder_path")]
    pub path: PathBuf,

    /// Credential passed to decoders that need one for newer log versions
    #[serde(default)]
    pub credential: Option<String>,

    #[serde(default = "default_credential_flag")]
    pub credential_flag: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Stdout shorter than this is ignored in favour of the output file
    #[serde(default = "default_min_stdout_bytes")]
    pub min_stdout_bytes: usize,
}

/// Heuristic binary scan settings
///
/// Thresholds are empirically tuned rather than derived; they are exposed here
/// so deployments can adjust them without a rebuild.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HeuristicConfig {
    #[serde(default = "default_header_len")]
    pub header_len: usize,

    #[serde(default = "default_stride")]
    pub stride: usize,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "default_cadence_ms")]
    pub cadence_ms: u64,

    #[serde(default = "default_min_points")]
    pub min_points: usize,

    #[serde(default = "default_max_speed_mps")]
    pub max_speed_mps: f64,

    #[serde(default = "default_gps_noise_m")]
    pub gps_noise_m: f64,

    #[serde(default = "default_max_step_m")]
    pub max_step_m: f64,

    #[serde(default = "default_relaxed_step_m")]
    pub relaxed_step_m: f64,

    #[serde(default = "default_max_gap_ms")]
    pub max_gap_ms: u64,

    #[serde(default = "default_swap_min_candidates")]
    pub swap_min_candidates: usize,

    #[serde(default = "default_swap_majority")]
    pub swap_majority: f64,

    #[serde(default = "default_swap_min_gain")]
    pub swap_min_gain: f64,

    #[serde(default = "default_relax_discard_ratio")]
    pub relax_discard_ratio: f64,

    #[serde(default = "default_relax_min_gain")]
    pub relax_min_gain: f64,

    #[serde(default = "default_outlier_leg_m")]
    pub outlier_leg_m: f64,

    #[serde(default = "default_outlier_max_removed")]
    pub outlier_max_removed: f64,
}

/// Structured frame normalizer settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NormalizerConfig {
    #[serde(default = "default_anomaly_window_ms")]
    pub anomaly_window_ms: u64,

    /// Emit photo/video markers from log heuristics
    ///
    /// Off by default: photo events are established from actual photo files.
    /// Decoder-confirmed moment markers are applied regardless.
    #[serde(default)]
    pub emit_camera_events: bool,

    #[serde(default = "default_photo_match_radius_m")]
    pub photo_match_radius_m: f64,

    /// Step between frames that have no time of their own
    #[serde(default = "default_line_cadence_ms")]
    pub line_cadence_ms: u64,
}

// Default value functions
fn default_decoder_path() -> PathBuf { PathBuf::from("dji-log") }
fn default_credential_flag() -> String { "--credential".to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_max_output_bytes() -> usize { 50 * 1024 * 1024 }
fn default_min_stdout_bytes() -> usize { 4 * 1024 }

fn default_header_len() -> usize { 100 }
fn default_stride() -> usize { 64 }
fn default_max_candidates() -> usize { 5_000 }
fn default_cadence_ms() -> u64 { 100 }
fn default_min_points() -> usize { 10 }
fn default_max_speed_mps() -> f64 { 50.0 }
fn default_gps_noise_m() -> f64 { 20.0 }
fn default_max_step_m() -> f64 { 10_000.0 }
fn default_relaxed_step_m() -> f64 { 5_000.0 }
fn default_max_gap_ms() -> u64 { 60_000 }
fn default_swap_min_candidates() -> usize { 20 }
fn default_swap_majority() -> f64 { 0.7 }
fn default_swap_min_gain() -> f64 { 0.5 }
fn default_relax_discard_ratio() -> f64 { 0.9 }
fn default_relax_min_gain() -> f64 { 0.5 }
fn default_outlier_leg_m() -> f64 { 50_000.0 }
fn default_outlier_max_removed() -> f64 { 0.3 }

fn default_anomaly_window_ms() -> u64 { 10_000 }
fn default_photo_match_radius_m() -> f64 { 100.0 }
fn default_line_cadence_ms() -> u64 { 100 }

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            path: default_decoder_path(),
            credential: None,
            credential_flag: default_credential_flag(),
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            min_stdout_bytes: default_min_stdout_bytes(),
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            header_len: default_header_len(),
            stride: default_stride(),
            max_candidates: default_max_candidates(),
            cadence_ms: default_cadence_ms(),
            min_points: default_min_points(),
            max_speed_mps: default_max_speed_mps(),
            gps_noise_m: default_gps_noise_m(),
            max_step_m: default_max_step_m(),
            relaxed_step_m: default_relaxed_step_m(),
            max_gap_ms: default_max_gap_ms(),
            swap_min_candidates: default_swap_min_candidates(),
            swap_majority: default_swap_majority(),
            swap_min_gain: default_swap_min_gain(),
            relax_discard_ratio: default_relax_discard_ratio(),
            relax_min_gain: default_relax_min_gain(),
            outlier_leg_m: default_outlier_leg_m(),
            outlier_max_removed: default_outlier_max_removed(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            anomaly_window_ms: default_anomaly_window_ms(),
            emit_camera_events: false,
            photo_match_radius_m: default_photo_match_radius_m(),
            line_cadence_ms: default_line_cadence_ms(),
        }
    }
}

impl ParserConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or holds
    /// values rejected by [`ParserConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: ParserConfig = toml::from_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ParserConfig::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FLIGHTLOG_*` overrides using `lookup` to read variables
    ///
    /// Taking a lookup function keeps tests away from the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DECODER_PATH).filter(|v| !v.trim().is_empty()) {
            self.decoder.path = PathBuf::from(path.trim());
        }
        if let Some(credential) = lookup(ENV_DECODER_CREDENTIAL).filter(|v| !v.trim().is_empty())
        {
            self.decoder.credential = Some(credential.trim().to_string());
        }
        if let Some(value) = lookup(ENV_DECODER_TIMEOUT_SECS) {
            self.decoder.timeout_secs = parse_env(ENV_DECODER_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_HEURISTIC_STRIDE) {
            self.heuristic.stride = parse_env(ENV_HEURISTIC_STRIDE, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_HEURISTIC_POINTS) {
            self.heuristic.min_points = parse_env(ENV_MIN_HEURISTIC_POINTS, &value)?;
        }
        if let Some(value) = lookup(ENV_ANOMALY_WINDOW_MS) {
            self.normalizer.anomaly_window_ms = parse_env(ENV_ANOMALY_WINDOW_MS, &value)?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heuristic.stride == 0 {
            return Err(ConfigError::Invalid(
                "heuristic stride must be greater than zero".to_string(),
            ));
        }
        if self.heuristic.min_points == 0 {
            return Err(ConfigError::Invalid(
                "minimum heuristic points must be greater than zero".to_string(),
            ));
        }
        if self.decoder.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "decoder timeout must be greater than zero".to_string(),
            ));
        }
        if self.decoder.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "decoder output limit must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.heuristic.swap_majority)
            || !(0.0..=1.0).contains(&self.heuristic.relax_discard_ratio)
            || !(0.0..=1.0).contains(&self.heuristic.outlier_max_removed)
        {
            return Err(ConfigError::Invalid(
                "heuristic ratios must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.decoder.timeout_secs, 60);
        assert_eq!(config.decoder.max_output_bytes, 50 * 1024 * 1024);
        assert_eq!(config.heuristic.stride, 64);
        assert_eq!(config.heuristic.header_len, 100);
        assert_eq!(config.heuristic.max_candidates, 5_000);
        assert_eq!(config.heuristic.min_points, 10);
        assert_eq!(config.normalizer.anomaly_window_ms, 10_000);
        assert!(!config.normalizer.emit_camera_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DECODER_PATH, "/opt/decoder/bin/dji-log"),
            (ENV_DECODER_CREDENTIAL, " secret "),
            (ENV_HEURISTIC_STRIDE, "32"),
            (ENV_MIN_HEURISTIC_POINTS, "25"),
            (ENV_ANOMALY_WINDOW_MS, "5000"),
        ]
        .into_iter()
        .collect();

        let mut config = ParserConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.decoder.path, PathBuf::from("/opt/decoder/bin/dji-log"));
        assert_eq!(config.decoder.credential.as_deref(), Some("secret"));
        assert_eq!(config.heuristic.stride, 32);
        assert_eq!(config.heuristic.min_points, 25);
        assert_eq!(config.normalizer.anomaly_window_ms, 5000);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = ParserConfig::default();
        let result = config.apply_env(|key| {
            (key == ENV_HEURISTIC_STRIDE).then(|| "sixty-four".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_stride_is_invalid() {
        let mut config = ParserConfig::default();
        config.heuristic.stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_min_points_is_invalid() {
        let mut config = ParserConfig::default();
        config
            .apply_env(|key| (key == ENV_MIN_HEURISTIC_POINTS).then(|| "0".to_string()))
            .unwrap();
        assert_eq!(config.heuristic.min_points, 0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flightlog.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[decoder]\ntimeout_secs = 30\n\n[normalizer]\nemit_camera_events = true"
        )
        .unwrap();

        let config = ParserConfig::load(&path).unwrap();
        assert_eq!(config.decoder.timeout_secs, 30);
        assert!(config.normalizer.emit_camera_events);
        // Untouched sections keep their defaults
        assert_eq!(config.heuristic.stride, 64);
        assert_eq!(config.normalizer.anomaly_window_ms, 10_000);
    }
}
