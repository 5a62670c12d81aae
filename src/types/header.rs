use serde::{Deserialize, Serialize};

/// Fixed-size prefix of a binary flight log
///
/// The prefix is 100 bytes long. Only the fields below are understood; the rest
/// of the region is skipped by the heuristic scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogHeader {
    /// Byte offset where the record area ends
    pub records_end: u64,
    /// Size of the trailing details area
    pub details_size: u16,
    /// Log format version
    pub format_version: u8,
}

impl LogHeader {
    /// Format versions from 13 on are encrypted and need a decoder credential
    pub fn requires_credential(&self) -> bool {
        self.format_version >= 13
    }
}
