use crate::config::{HeuristicConfig, ParserConfig};
use crate::error::{ParseError, ParseResult};
use crate::filters::check_heuristic_quality;
use crate::parser::decoder::run_decoder;
use crate::parser::frame::normalize_decoder_output;
use crate::parser::header::parse_log_header;
use crate::parser::heuristic::{build_heuristic_flight_log, extract_heuristic_points};
use crate::types::LogHeader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parse a flight log file
///
/// The filename (without directories) is used for the flight date fallback.
pub async fn parse_flight_log_file(path: &Path, config: &ParserConfig) -> ParseResult {
    let data = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    debug!(
        "Read {} bytes ({:.2} MB) from {}",
        data.len(),
        data.len() as f64 / 1024.0 / 1024.0,
        path.display()
    );
    parse_flight_log(&data, &filename, config).await
}

/// Parse a flight log held in memory
///
/// The trusted decoder is tried first. Only when the decoder binary itself is
/// missing does parsing fall back to heuristic extraction; every other decoder
/// failure is returned as is. Results of the two strategies are never mixed.
pub async fn parse_flight_log(data: &[u8], filename: &str, config: &ParserConfig) -> ParseResult {
    let header = parse_log_header(data);
    let format_version = header.as_ref().map(|h| h.format_version);

    if header.as_ref().is_some_and(LogHeader::requires_credential)
        && config.decoder.credential.is_none()
    {
        debug!(
            "{}: format version {:?} usually needs a decoder credential and none is configured",
            filename, format_version
        );
    }

    match run_decoder(data, &config.decoder, format_version).await {
        Ok(output) => {
            info!(
                "{}: decoded {} bytes of {} output{}",
                filename,
                output.text.len(),
                output.channel.as_str(),
                if output.salvaged { " (salvaged)" } else { "" }
            );
            let mut log = normalize_decoder_output(&output.text, filename, &config.normalizer)?;
            if log.metadata.format_version.is_none() {
                log.metadata.format_version = format_version;
            }
            log.metadata
                .extra
                .insert("decoderChannel".to_string(), output.channel.as_str().to_string());
            Ok(log)
        }
        Err(ParseError::ToolNotFound { tool }) => {
            warn!(
                "{}: trusted decoder {} not found, falling back to heuristic extraction",
                filename,
                tool.display()
            );
            parse_heuristic(data, filename, header.as_ref(), &config.heuristic)
        }
        Err(e) => Err(e),
    }
}

/// Heuristic extraction followed by the quality gates
pub fn parse_heuristic(
    data: &[u8],
    filename: &str,
    header: Option<&LogHeader>,
    config: &HeuristicConfig,
) -> ParseResult {
    let points = extract_heuristic_points(data, config);
    check_heuristic_quality(&points, config.min_points)?;
    Ok(build_heuristic_flight_log(filename, header, points))
}
