use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Warning or error derived from telemetry thresholds or fault flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub timestamp_offset_ms: u32,
    pub details: serde_json::Value,
}
