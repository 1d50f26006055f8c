//! Core types and shared plumbing for the recon pipeline.

pub mod batch;
pub mod error;
pub mod http;
pub mod model;
pub mod risk;
pub mod sink;

pub use error::{ReconError, SinkError};
pub use model::*;
pub use sink::{FanoutSink, MemorySink, ScanSink};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current wall-clock time as unix milliseconds.
pub fn now_ms() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as i64
}
