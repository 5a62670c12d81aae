//! Trusted decoder subprocess
//!
//! The decoder is invoked as `<tool> <input> [<credential-flag> <value>] --output <file>`
//! inside a private temporary directory that is removed on every exit path.
//! Its stdout and stderr are read with a size bound while the process runs,
//! and the whole run is bounded by a timeout after which the process is
//! killed.
//!
//! What the run produced is resolved by a small state machine:
//!
//! ```text
//! Invoking ──► CapturedStdout   large frame-array stdout, or its complete
//!          │                    frames when it overflowed without a file
//!          ├─► CapturedFile     output file (preferred on overflow)
//!          └─► Failed(reason)   credential, overflow, generic failure
//! ```

use crate::config::DecoderConfig;
use crate::error::{ParseError, Result};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Diagnostics kept from stderr
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// Stdout bytes scanned for diagnostics when stderr is empty
const STDOUT_DIAGNOSTIC_BYTES: usize = 2 * 1024;

/// Where accepted decoder output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    File,
}

impl OutputChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::File => "file",
        }
    }
}

/// Decoder output accepted for normalization
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderOutput {
    pub text: String,
    pub channel: OutputChannel,
    /// True when stdout overflowed and this output was recovered instead
    pub salvaged: bool,
}

/// Everything collected from one finished decoder run
#[derive(Debug)]
pub struct CapturedRun {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr: Vec<u8>,
    /// Output file contents, if the file exists and fits the output bound
    pub file: Option<Vec<u8>>,
    pub file_too_large: bool,
}

impl CapturedRun {
    /// Stderr text, or the head of stdout when stderr is empty
    pub fn diagnostics(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if !stderr.is_empty() {
            return stderr;
        }
        let head = &self.stdout[..self.stdout.len().min(STDOUT_DIAGNOSTIC_BYTES)];
        String::from_utf8_lossy(head).trim().to_string()
    }
}

/// Decoder run states
#[derive(Debug)]
pub enum DecoderState {
    Invoking,
    CapturedStdout(DecoderOutput),
    CapturedFile(DecoderOutput),
    Failed(ParseError),
}

impl DecoderState {
    pub fn name(&self) -> &'static str {
        match self {
            DecoderState::Invoking => "invoking",
            DecoderState::CapturedStdout(_) => "captured-stdout",
            DecoderState::CapturedFile(_) => "captured-file",
            DecoderState::Failed(_) => "failed",
        }
    }

    /// Resolve a finished run
    ///
    /// Only meaningful from `Invoking`; settled states are returned unchanged.
    pub fn on_exit(
        self,
        run: CapturedRun,
        config: &DecoderConfig,
        format_version: Option<u8>,
    ) -> DecoderState {
        if !matches!(self, DecoderState::Invoking) {
            return self;
        }

        if !run.status.success() {
            let diagnostics = run.diagnostics();
            let error = classify_credential_failure(&diagnostics, format_version).unwrap_or(
                ParseError::DecoderFailed {
                    status: run.status.code(),
                    diagnostics,
                },
            );
            return DecoderState::Failed(error);
        }

        let stdout = String::from_utf8_lossy(&run.stdout).into_owned();
        let file = run
            .file
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|text| !text.trim().is_empty());

        if run.stdout_truncated {
            warn!(
                "Decoder stdout exceeded {} bytes, trying to salvage output",
                config.max_output_bytes
            );
            if let Some(text) = file {
                return DecoderState::CapturedFile(DecoderOutput {
                    text,
                    channel: OutputChannel::File,
                    salvaged: true,
                });
            }
            if let Some(text) = salvage_frame_array(&stdout).filter(|t| is_complete_json(t)) {
                info!(
                    "Recovered {} of {} stdout bytes up to the last complete frame",
                    text.len(),
                    stdout.len()
                );
                return DecoderState::CapturedStdout(DecoderOutput {
                    text,
                    channel: OutputChannel::Stdout,
                    salvaged: true,
                });
            }
            return DecoderState::Failed(ParseError::OutputTooLarge {
                limit_bytes: config.max_output_bytes,
            });
        }

        if prefers_stdout(&stdout, config.min_stdout_bytes) {
            return DecoderState::CapturedStdout(DecoderOutput {
                text: stdout,
                channel: OutputChannel::Stdout,
                salvaged: false,
            });
        }

        if let Some(text) = file {
            return DecoderState::CapturedFile(DecoderOutput {
                text,
                channel: OutputChannel::File,
                salvaged: false,
            });
        }

        if run.file_too_large {
            return DecoderState::Failed(ParseError::OutputTooLarge {
                limit_bytes: config.max_output_bytes,
            });
        }

        // Short stdout is still better than nothing when it is the only output
        if looks_like_json(&stdout) {
            return DecoderState::CapturedStdout(DecoderOutput {
                text: stdout,
                channel: OutputChannel::Stdout,
                salvaged: false,
            });
        }

        let diagnostics = run.diagnostics();
        DecoderState::Failed(
            classify_credential_failure(&diagnostics, format_version).unwrap_or_else(|| {
                ParseError::MalformedOutput(if diagnostics.is_empty() {
                    "decoder exited successfully but produced no output".to_string()
                } else {
                    format!("decoder produced no output: {diagnostics}")
                })
            }),
        )
    }

    pub fn into_output(self) -> Result<DecoderOutput> {
        match self {
            DecoderState::CapturedStdout(output) | DecoderState::CapturedFile(output) => Ok(output),
            DecoderState::Failed(error) => Err(error),
            DecoderState::Invoking => Err(ParseError::MalformedOutput(
                "decoder run never completed".to_string(),
            )),
        }
    }
}

/// Stdout wins when it is large and holds a frame array
pub fn prefers_stdout(stdout: &str, min_bytes: usize) -> bool {
    if stdout.len() < min_bytes {
        return false;
    }
    let trimmed = stdout.trim_start();
    trimmed.starts_with('[') || trimmed.contains("\"frames\"")
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}

fn is_complete_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

fn closes_frames_key(prefix: &str) -> bool {
    prefix
        .trim_end()
        .strip_suffix(':')
        .is_some_and(|key| key.trim_end().ends_with("\"frames\""))
}

/// Cut truncated decoder output back to its last complete frame
///
/// Works on a bare frame array and on the `{ ..., "frames": [...] }` wrapper;
/// the open brackets around the cut are closed again. Returns `None` if no
/// frame is complete.
pub fn salvage_frame_array(text: &str) -> Option<String> {
    let mut stack: Vec<u8> = Vec::new();
    let mut frames_depth: Option<usize> = None;
    let mut cut: Option<(usize, String)> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(byte),
            b'[' => {
                let opens_frames = frames_depth.is_none()
                    && (stack.is_empty() || (stack.len() == 1 && closes_frames_key(&text[..i])));
                stack.push(byte);
                if opens_frames {
                    frames_depth = Some(stack.len());
                }
            }
            b'}' | b']' => {
                stack.pop()?;
                if frames_depth.is_some_and(|depth| stack.len() == depth) {
                    let closers = stack
                        .iter()
                        .rev()
                        .map(|open| if *open == b'[' { ']' } else { '}' })
                        .collect();
                    cut = Some((i + 1, closers));
                }
            }
            _ => {}
        }
    }

    let (end, closers) = cut?;
    Some(format!("{}{}", &text[..end], closers))
}

/// Recognize credential problems in decoder diagnostics
///
/// Matching is case-insensitive. Invalid credentials are checked before
/// missing ones, since messages for a rejected key often mention both.
pub fn classify_credential_failure(
    diagnostics: &str,
    format_version: Option<u8>,
) -> Option<ParseError> {
    let lower = diagnostics.to_lowercase();
    let mentions_credential = lower.contains("key") || lower.contains("credential");

    let invalid = (lower.contains("invalid") && mentions_credential)
        || lower.contains("unauthorized")
        || lower.contains("403");
    if invalid {
        return Some(ParseError::CredentialInvalid {
            diagnostics: diagnostics.to_string(),
        });
    }

    let required = mentions_credential
        && (lower.contains("required") || lower.contains("missing") || lower.contains("needed"));
    if required {
        return Some(ParseError::CredentialRequired {
            format_version,
            diagnostics: diagnostics.to_string(),
        });
    }
    None
}

/// Read up to `limit` bytes, then drain the rest so the writer never blocks
async fn read_bounded<R>(reader: R, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut limited = reader.take(cap);
    limited.read_to_end(&mut buffer).await?;

    let truncated = buffer.len() > limit;
    if truncated {
        buffer.truncate(limit);
        tokio::io::copy(&mut limited.into_inner(), &mut tokio::io::sink()).await?;
    }
    Ok((buffer, truncated))
}

async fn read_output_file(path: &Path, limit: usize) -> Result<(Option<Vec<u8>>, bool)> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((None, false)),
        Err(e) => return Err(e.into()),
    };
    if metadata.len() > u64::try_from(limit).unwrap_or(u64::MAX) {
        warn!(
            "Decoder output file is {} bytes, over the {} byte limit",
            metadata.len(),
            limit
        );
        return Ok((None, true));
    }
    Ok((Some(tokio::fs::read(path).await?), false))
}

/// Spawn the decoder on `input_path` and collect everything it produced
async fn invoke(
    input_path: &Path,
    output_path: &Path,
    config: &DecoderConfig,
) -> Result<CapturedRun> {
    let mut command = Command::new(&config.path);
    command.arg(input_path);
    if let Some(credential) = &config.credential {
        command.arg(&config.credential_flag).arg(credential);
    }
    command
        .arg("--output")
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ParseError::ToolNotFound {
                tool: config.path.clone(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "decoder stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "decoder stderr not captured"))?;

    let run = async {
        tokio::try_join!(
            read_bounded(stdout, config.max_output_bytes),
            read_bounded(stderr, MAX_DIAGNOSTIC_BYTES),
            child.wait(),
        )
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    let ((stdout, stdout_truncated), (stderr, _), status) =
        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Decoder still running after {}s, killing it",
                    config.timeout_secs
                );
                if let Err(e) = child.start_kill() {
                    debug!("Failed to kill decoder: {}", e);
                }
                return Err(ParseError::SubprocessTimeout {
                    seconds: config.timeout_secs,
                });
            }
        };

    let (file, file_too_large) = read_output_file(output_path, config.max_output_bytes).await?;
    debug!(
        "Decoder exited with {}: stdout {} bytes, stderr {} bytes, output file {}",
        status,
        stdout.len(),
        stderr.len(),
        match (&file, file_too_large) {
            (Some(bytes), _) => format!("{} bytes", bytes.len()),
            (None, true) => "over limit".to_string(),
            (None, false) => "missing".to_string(),
        }
    );

    Ok(CapturedRun {
        status,
        stdout,
        stdout_truncated,
        stderr,
        file,
        file_too_large,
    })
}

/// Run the trusted decoder over `data`
///
/// # Errors
///
/// - [`ParseError::ToolNotFound`] if the decoder binary does not exist
/// - [`ParseError::SubprocessTimeout`] if it runs past the configured timeout
/// - [`ParseError::CredentialRequired`] / [`ParseError::CredentialInvalid`]
/// - [`ParseError::OutputTooLarge`] if output overflowed and nothing could be salvaged
/// - [`ParseError::DecoderFailed`] for any other non-zero exit
/// - [`ParseError::Io`] for temporary file failures
pub async fn run_decoder(
    data: &[u8],
    config: &DecoderConfig,
    format_version: Option<u8>,
) -> Result<DecoderOutput> {
    let workdir = tempfile::Builder::new().prefix("flightlog-").tempdir()?;
    let input_path = workdir.path().join("input.txt");
    let output_path = workdir.path().join("output.json");
    tokio::fs::write(&input_path, data).await?;

    let state = DecoderState::Invoking;
    debug!(
        "Decoder state {}: {} on {} bytes",
        state.name(),
        config.path.display(),
        data.len()
    );

    let run = invoke(&input_path, &output_path, config).await?;
    let state = state.on_exit(run, config, format_version);
    info!("Decoder state {}", state.name());

    state.into_output()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[cfg(unix)]
    fn status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    fn run(code: i32, stdout: &str, stderr: &str, file: Option<&str>) -> CapturedRun {
        CapturedRun {
            status: status(code),
            stdout: stdout.as_bytes().to_vec(),
            stdout_truncated: false,
            stderr: stderr.as_bytes().to_vec(),
            file: file.map(|f| f.as_bytes().to_vec()),
            file_too_large: false,
        }
    }

    #[test]
    fn test_credential_classification() {
        let required = classify_credential_failure("Error: API key required for version 14", Some(14));
        assert!(matches!(
            required,
            Some(ParseError::CredentialRequired {
                format_version: Some(14),
                ..
            })
        ));

        let invalid = classify_credential_failure("Invalid API KEY supplied", None).unwrap();
        assert_eq!(invalid.kind(), ParseErrorKind::CredentialInvalid);

        let forbidden = classify_credential_failure("server responded 403", None).unwrap();
        assert_eq!(forbidden.kind(), ParseErrorKind::CredentialInvalid);

        assert!(classify_credential_failure("Segmentation fault", None).is_none());
        assert!(classify_credential_failure("file missing", None).is_none());
    }

    #[test]
    fn test_stdout_preference() {
        let frames = format!("[{}]", vec!["{}"; 2_000].join(","));
        assert!(prefers_stdout(&frames, 4096));
        assert!(!prefers_stdout("[{}]", 4096));

        let wrapped = format!("{{\"frames\": [{}]}}", vec!["{}"; 2_000].join(","));
        assert!(prefers_stdout(&wrapped, 4096));

        let chatter = "x".repeat(8_000);
        assert!(!prefers_stdout(&chatter, 4096));
    }

    #[cfg(unix)]
    #[test]
    fn test_state_prefers_large_stdout_over_file() {
        let config = DecoderConfig::default();
        let frames = format!("[{}]", vec!["{}"; 2_000].join(","));
        let state = DecoderState::Invoking.on_exit(
            run(0, &frames, "", Some("{\"type\": \"FeatureCollection\"}")),
            &config,
            None,
        );
        assert_eq!(state.name(), "captured-stdout");
    }

    #[cfg(unix)]
    #[test]
    fn test_state_uses_file_for_small_stdout() {
        let config = DecoderConfig::default();
        let state = DecoderState::Invoking.on_exit(
            run(0, "decoded 3 frames", "", Some("{\"type\": \"FeatureCollection\"}")),
            &config,
            None,
        );
        let output = state.into_output().unwrap();
        assert_eq!(output.channel, OutputChannel::File);
        assert!(!output.salvaged);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_salvages_overflowed_stdout_from_file() {
        let config = DecoderConfig::default();
        let mut captured = run(0, "[{\"osd\":", "", Some("[]"));
        captured.stdout_truncated = true;
        let output = DecoderState::Invoking
            .on_exit(captured, &config, None)
            .into_output()
            .unwrap();
        assert_eq!(output.channel, OutputChannel::File);
        assert!(output.salvaged);

        let mut captured = run(0, "[{\"osd\":", "", None);
        captured.stdout_truncated = true;
        let err = DecoderState::Invoking
            .on_exit(captured, &config, None)
            .into_output()
            .unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::OutputTooLarge);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_recovers_truncated_stdout_frames() {
        let config = DecoderConfig::default();
        let stdout = r#"[{"osd":{"latitude":37.0,"longitude":-122.0}},{"osd":{"latitude":37.1,"longitude":-122.0}},{"osd":"#;
        let mut captured = run(0, stdout, "", None);
        captured.stdout_truncated = true;

        let output = DecoderState::Invoking
            .on_exit(captured, &config, None)
            .into_output()
            .unwrap();
        assert_eq!(output.channel, OutputChannel::Stdout);
        assert!(output.salvaged);

        let frames: Vec<serde_json::Value> = serde_json::from_str(&output.text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["osd"]["latitude"], 37.1);
    }

    #[test]
    fn test_salvage_frame_array() {
        // Brackets and escaped quotes inside strings do not count
        let text = r#"[{"app":{"warn":"low \"}]\" battery"}},{"osd":{"cells":[3.9,3.8]}},{"osd":{"cells":[3.9"#;
        let salvaged = salvage_frame_array(text).unwrap();
        let frames: Vec<serde_json::Value> = serde_json::from_str(&salvaged).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["app"]["warn"], "low \"}]\" battery");

        let wrapped = r#"{"version":14,"details":{"momentPicLatitude":[37.0]},"frames":[{"osd":{}},{"osd":{"lat"#;
        let salvaged = salvage_frame_array(wrapped).unwrap();
        let value: serde_json::Value = serde_json::from_str(&salvaged).unwrap();
        assert_eq!(value["frames"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["details"]["momentPicLatitude"][0], 37.0);

        assert_eq!(salvage_frame_array(r#"[{"osd":{"latitude":3"#), None);
        assert_eq!(salvage_frame_array("decoder: out of memory"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_failures() {
        let config = DecoderConfig::default();

        let err = DecoderState::Invoking
            .on_exit(run(1, "", "credential is required", None), &config, Some(13))
            .into_output()
            .unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::CredentialRequired);

        let err = DecoderState::Invoking
            .on_exit(run(2, "", "unexpected EOF in record 12", None), &config, None)
            .into_output()
            .unwrap_err();
        match err {
            ParseError::DecoderFailed {
                status,
                diagnostics,
            } => {
                assert_eq!(status, Some(2));
                assert_eq!(diagnostics, "unexpected EOF in record 12");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = DecoderState::Invoking
            .on_exit(run(0, "", "", None), &config, None)
            .into_output()
            .unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MalformedOutput);
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let config = DecoderConfig {
            path: "/nonexistent/flightlog-decoder".into(),
            ..Default::default()
        };
        let err = run_decoder(b"data", &config, None).await.unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::ToolNotFound);
    }

    #[tokio::test]
    async fn test_read_bounded_truncates_and_drains() {
        let data = vec![7u8; 10_000];
        let (buffer, truncated) = read_bounded(&data[..], 4_096).await.unwrap();
        assert_eq!(buffer.len(), 4_096);
        assert!(truncated);

        let (buffer, truncated) = read_bounded(&data[..100], 4_096).await.unwrap();
        assert_eq!(buffer.len(), 100);
        assert!(!truncated);
    }
}
