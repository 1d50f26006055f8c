//! Output side of a scan: job lifecycle, progress, and per-host records.

use crate::error::SinkError;
use crate::model::{HostRecord, ProgressUpdate, ScanJob};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Collaborator that externalizes scan state. Calls are short and
/// synchronous; a returned error is logged by the caller and never aborts a scan.
pub trait ScanSink: Send + Sync {
    fn job_started(&self, job: &ScanJob) -> Result<(), SinkError>;
    fn progress(&self, update: &ProgressUpdate) -> Result<(), SinkError>;
    fn persist_hosts(&self, scan_id: Uuid, records: &[HostRecord]) -> Result<(), SinkError>;
    fn job_finished(&self, job: &ScanJob) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub started: Vec<ScanJob>,
    pub progress: Vec<ProgressUpdate>,
    pub hosts: Vec<HostRecord>,
    pub finished: Vec<ScanJob>,
}

/// Keeps everything in memory. Used by the CLI when no database is given and by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryState {
        match self.state.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn hosts(&self) -> Vec<HostRecord> {
        self.snapshot().hosts
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.snapshot().progress.iter().map(|p| p.progress).collect()
    }

    fn with<F: FnOnce(&mut MemoryState)>(&self, f: F) -> Result<(), SinkError> {
        let mut guard = self.state.lock().map_err(|_| SinkError::new("memory sink poisoned"))?;
        f(&mut guard);
        Ok(())
    }
}

impl ScanSink for MemorySink {
    fn job_started(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.with(|s| s.started.push(job.clone()))
    }

    fn progress(&self, update: &ProgressUpdate) -> Result<(), SinkError> {
        self.with(|s| s.progress.push(update.clone()))
    }

    fn persist_hosts(&self, _scan_id: Uuid, records: &[HostRecord]) -> Result<(), SinkError> {
        self.with(|s| s.hosts.extend_from_slice(records))
    }

    fn job_finished(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.with(|s| s.finished.push(job.clone()))
    }
}

/// Forwards every call to each inner sink in order. All sinks are called
/// even when one fails; the first error is returned.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ScanSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ScanSink>>) -> Self {
        FanoutSink { sinks }
    }

    fn each<F: Fn(&dyn ScanSink) -> Result<(), SinkError>>(&self, f: F) -> Result<(), SinkError> {
        let mut first = None;
        for sink in &self.sinks {
            if let Err(e) = f(sink.as_ref()) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl ScanSink for FanoutSink {
    fn job_started(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.each(|s| s.job_started(job))
    }

    fn progress(&self, update: &ProgressUpdate) -> Result<(), SinkError> {
        self.each(|s| s.progress(update))
    }

    fn persist_hosts(&self, scan_id: Uuid, records: &[HostRecord]) -> Result<(), SinkError> {
        self.each(|s| s.persist_hosts(scan_id, records))
    }

    fn job_finished(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.each(|s| s.job_finished(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanConfig;

    #[test]
    fn memory_sink_records_calls() {
        let sink = MemorySink::new();
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        sink.job_started(&job).unwrap();
        sink.progress(&ProgressUpdate { scan_id: job.id, progress: 15, status_hint: "enumerated".into() }).unwrap();
        sink.persist_hosts(job.id, &[HostRecord::new("a.foo.com")]).unwrap();
        sink.job_finished(&job).unwrap();

        let snap = sink.snapshot();
        assert_eq!(snap.started.len(), 1);
        assert_eq!(sink.progress_values(), vec![15]);
        assert_eq!(sink.hosts()[0].hostname, "a.foo.com");
        assert_eq!(snap.finished[0].id, job.id);
    }

    struct Broken;

    impl ScanSink for Broken {
        fn job_started(&self, _: &ScanJob) -> Result<(), SinkError> {
            Err(SinkError::new("down"))
        }
        fn progress(&self, _: &ProgressUpdate) -> Result<(), SinkError> {
            Err(SinkError::new("down"))
        }
        fn persist_hosts(&self, _: Uuid, _: &[HostRecord]) -> Result<(), SinkError> {
            Err(SinkError::new("down"))
        }
        fn job_finished(&self, _: &ScanJob) -> Result<(), SinkError> {
            Err(SinkError::new("down"))
        }
    }

    #[test]
    fn fanout_reaches_every_sink_despite_errors() {
        let memory = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![Arc::new(Broken), memory.clone()]);
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));

        assert!(fanout.persist_hosts(job.id, &[HostRecord::new("a.foo.com")]).is_err());
        assert_eq!(memory.hosts().len(), 1);
    }
}
