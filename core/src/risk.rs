//! Deterministic risk scoring for a finished host record.
//!
//! Overrides are checked first and jump straight to a fixed level; only when
//! none applies does the additive score go through the threshold table.

use crate::model::{Confidence, HostRecord, RiskLevel};

/// Substring that marks a sensitive-data exposure vulnerability entry.
pub const SENSITIVE_DATA_MARKER: &str = "exposes sensitive data";

const CORS_ISSUE_POINTS: u32 = 2;
const VULNERABILITY_POINTS: u32 = 3;
const OPEN_PORT_CAP: u32 = 5;
const CLOUD_FINDING_POINTS: u32 = 1;

type Override = (&'static str, fn(&HostRecord) -> bool, RiskLevel);

const OVERRIDES: &[Override] = &[
    ("high-confidence takeover", has_high_confidence_takeover, RiskLevel::Critical),
    ("sensitive data exposure", exposes_sensitive_data, RiskLevel::Critical),
];

const THRESHOLDS: &[(u32, RiskLevel)] = &[
    (15, RiskLevel::Critical),
    (8, RiskLevel::High),
    (4, RiskLevel::Medium),
];

fn has_high_confidence_takeover(r: &HostRecord) -> bool {
    r.takeover.iter().any(|e| e.confidence == Confidence::High)
}

fn exposes_sensitive_data(r: &HostRecord) -> bool {
    r.vulnerabilities.iter().any(|v| v.contains(SENSITIVE_DATA_MARKER))
}

pub fn score(r: &HostRecord) -> u32 {
    let cors = r.cors_issues.len() as u32 * CORS_ISSUE_POINTS;
    let vulns = r.vulnerabilities.len() as u32 * VULNERABILITY_POINTS;
    let ports = (r.open_ports.len() as u32).min(OPEN_PORT_CAP);
    let cloud = r.cloud_findings.len() as u32 * CLOUD_FINDING_POINTS;
    let takeover: u32 = r.takeover.iter().map(|e| e.confidence.weight()).sum();
    cors + vulns + ports + cloud + takeover
}

/// Name of the first override that fires, if any.
pub fn matching_override(r: &HostRecord) -> Option<(&'static str, RiskLevel)> {
    OVERRIDES
        .iter()
        .find(|(_, applies, _)| applies(r))
        .map(|(name, _, level)| (*name, *level))
}

pub fn classify(r: &HostRecord) -> RiskLevel {
    if let Some((_, level)) = matching_override(r) {
        return level;
    }
    let s = score(r);
    THRESHOLDS
        .iter()
        .find(|(min, _)| s >= *min)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::Low)
}
