use serde::{Deserialize, Serialize};

/// One row of the `scans` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRow {
    pub scan_id: String,
    pub domain: String,
    pub status: String,
    pub progress: i64,
    pub harvested: i64,
    pub total_candidates: i64,
    pub live_count: i64,
    pub vulnerabilities: i64,
    pub high_risk: i64,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRow {
    pub scope: String,
    pub code: String,
    pub message: String,
    pub at_ms: i64,
}
