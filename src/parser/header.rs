use crate::parser::stream::LogDataStream;
use crate::types::LogHeader;
use tracing::debug;

/// Length of the fixed header region at the start of every log
pub const HEADER_LEN: usize = 100;

/// Offset of the format version byte inside the header
const FORMAT_VERSION_OFFSET: usize = 10;

/// Parse the fixed header region
///
/// Returns `None` when the buffer is shorter than the header. The values are
/// not validated; the heuristic path never trusts them for record boundaries.
pub fn parse_log_header(data: &[u8]) -> Option<LogHeader> {
    if data.len() < HEADER_LEN {
        debug!(
            "Buffer of {} bytes is shorter than the {} byte header",
            data.len(),
            HEADER_LEN
        );
        return None;
    }

    let mut stream = LogDataStream::new(data);
    let records_end = stream.read_u64()?;
    let details_size = stream.read_u16()?;
    stream.set_position(FORMAT_VERSION_OFFSET);
    let format_version = stream.read_u8()?;

    let header = LogHeader {
        records_end,
        details_size,
        format_version,
    };

    debug!(
        "Log header: version {}, records end at {}, details {} bytes",
        header.format_version, header.records_end, header.details_size
    );

    Some(header)
}
