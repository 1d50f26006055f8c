use crate::model::JobStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
    #[error("illegal job transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis of {host} failed: {reason}")]
    Analysis { host: String, reason: String },
    #[error("scan cancelled")]
    Cancelled,
}

/// Failure reported by a result sink. Never fatal to a scan.
#[derive(Debug, Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        SinkError(msg.into())
    }
}
