use crate::error::ReconError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_CONCURRENCY: usize = 200;
pub const MAX_TIMEOUT_SECONDS: u64 = 60;
/// Upper bound on stored takeover proof text, in characters.
pub const PROOF_MAX_CHARS: usize = 500;

/// Scan request handed over by the job-submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub domain: String,
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub enable_port_scan: bool,
    pub enable_cors_check: bool,
    pub enable_takeover_check: bool,
    pub enable_cloud_predict: bool,
    pub fetch_favicon: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            domain: String::new(),
            concurrency: 20,
            timeout_seconds: 10,
            enable_port_scan: true,
            enable_cors_check: true,
            enable_takeover_check: true,
            enable_cloud_predict: true,
            fetch_favicon: false,
        }
    }
}

impl ScanConfig {
    pub fn for_domain(domain: &str) -> Self {
        ScanConfig { domain: domain.trim().to_lowercase(), ..Default::default() }
    }

    /// Bounds checks only; domain syntax is checked by the hostname validator.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.domain.trim().is_empty() {
            return Err(ReconError::InvalidConfig("domain is empty".into()));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ReconError::InvalidConfig(format!(
                "concurrency must be within 1..={}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ReconError::InvalidConfig(format!(
                "timeout_seconds must be within 1..={}, got {}",
                MAX_TIMEOUT_SECONDS, self.timeout_seconds
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// pending -> running -> {completed, failed}; nothing leaves a terminal state.
    pub fn can_transition(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTotals {
    /// Raw names returned by certificate transparency.
    pub harvested: usize,
    /// Validated, in-scope hostnames.
    pub total_candidates: usize,
    pub live: usize,
    pub vulnerabilities: usize,
    pub high_risk: usize,
}

impl ScanTotals {
    pub fn tally(&mut self, records: &[HostRecord]) {
        self.vulnerabilities = records.iter().map(|r| r.vulnerabilities.len()).sum();
        self.high_risk = records.iter().filter(|r| r.risk >= RiskLevel::High).count();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub domain: String,
    pub status: JobStatus,
    pub progress: u8,
    pub config: ScanConfig,
    pub totals: ScanTotals,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

impl ScanJob {
    pub fn new(config: ScanConfig) -> Self {
        ScanJob {
            id: Uuid::now_v7(),
            domain: config.domain.clone(),
            status: JobStatus::Pending,
            progress: 0,
            config,
            totals: ScanTotals::default(),
            started_at: crate::now_ms(),
            completed_at: None,
            error: None,
        }
    }

    pub fn transition(&mut self, to: JobStatus) -> Result<(), ReconError> {
        if !self.status.can_transition(to) {
            return Err(ReconError::IllegalTransition { from: self.status, to });
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(crate::now_ms());
        }
        Ok(())
    }

    /// Move progress forward. Values below the current one are ignored and
    /// 100 is reserved for `complete`. Returns whether progress changed.
    pub fn advance(&mut self, progress: u8) -> bool {
        let capped = progress.min(99);
        if self.status != JobStatus::Running || capped <= self.progress {
            return false;
        }
        self.progress = capped;
        true
    }

    pub fn complete(&mut self, totals: ScanTotals) -> Result<(), ReconError> {
        self.transition(JobStatus::Completed)?;
        self.totals = totals;
        self.progress = 100;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ReconError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub scan_id: Uuid,
    pub progress: u8,
    pub status_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Risk points contributed by one piece of evidence at this tier.
    pub fn weight(self) -> u32 {
        match self {
            Confidence::High => 10,
            Confidence::Medium => 6,
            Confidence::Low => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeoverEvidence {
    pub service: String,
    pub confidence: Confidence,
    pub proof: String,
}

impl TakeoverEvidence {
    pub fn new(service: &str, confidence: Confidence, proof: &str) -> Self {
        TakeoverEvidence {
            service: service.to_string(),
            confidence,
            proof: proof.chars().take(PROOF_MAX_CHARS).collect(),
        }
    }
}

/// Findings for one live hostname. Built once during deep analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub hostname: String,
    pub ip: Option<String>,
    pub http_status: Option<u16>,
    pub server_header: Option<String>,
    pub open_ports: BTreeSet<u16>,
    pub cors_issues: Vec<String>,
    pub technologies: Vec<String>,
    pub vulnerabilities: Vec<String>,
    pub risk: RiskLevel,
    pub fingerprints: BTreeMap<String, String>,
    pub takeover: Vec<TakeoverEvidence>,
    pub cloud_findings: Vec<String>,
}

impl HostRecord {
    pub fn new(hostname: &str) -> Self {
        HostRecord {
            hostname: hostname.to_string(),
            ip: None,
            http_status: None,
            server_header: None,
            open_ports: BTreeSet::new(),
            cors_issues: Vec::new(),
            technologies: Vec::new(),
            vulnerabilities: Vec::new(),
            risk: RiskLevel::Low,
            fingerprints: BTreeMap::new(),
            takeover: Vec::new(),
            cloud_findings: Vec::new(),
        }
    }
}
