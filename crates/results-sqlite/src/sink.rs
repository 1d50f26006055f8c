use crate::Db;
use anyhow::Result;
use recon_core::{now_ms, HostRecord, ProgressUpdate, ScanJob, ScanSink, SinkError};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// `ScanSink` backed by a SQLite database.
pub struct SqliteSink {
    db: Mutex<Db>,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(SqliteSink { db: Mutex::new(Db::open_or_create(path)?) })
    }

    pub fn from_db(db: Db) -> Self {
        SqliteSink { db: Mutex::new(db) }
    }

    /// Run `f` against the database, for reading results back.
    pub fn with_db<T>(&self, f: impl FnOnce(&Db) -> Result<T>) -> Result<T> {
        let db = self.lock().map_err(|e| anyhow::anyhow!(e.0))?;
        f(&db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Db>, SinkError> {
        self.db.lock().map_err(|_| SinkError::new("sqlite sink poisoned"))
    }

    /// Apply `op`; on failure, try to leave a trace in the `errors` table
    /// before handing the error back.
    fn record(&self, scan_id: &Uuid, scope: &str, op: impl FnOnce(&Db) -> Result<()>) -> Result<(), SinkError> {
        let db = self.lock()?;
        match op(&db) {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = format!("{:#}", e);
                if let Err(again) = db.add_error(scan_id, scope, "sink_write", &message, now_ms()) {
                    warn!("could not record sink error for {}: {}", scan_id, again);
                }
                Err(SinkError::new(message))
            }
        }
    }
}

impl ScanSink for SqliteSink {
    fn job_started(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.record(&job.id, "job_started", |db| db.begin_scan(job))
    }

    fn progress(&self, update: &ProgressUpdate) -> Result<(), SinkError> {
        self.record(&update.scan_id, "progress", |db| db.update_progress(&update.scan_id, update.progress))
    }

    fn persist_hosts(&self, scan_id: Uuid, records: &[HostRecord]) -> Result<(), SinkError> {
        self.record(&scan_id, "persist_hosts", |db| {
            let written = db.insert_results(&scan_id, records)?;
            debug!("stored {} of {} host records for {}", written, records.len(), scan_id);
            Ok(())
        })
    }

    fn job_finished(&self, job: &ScanJob) -> Result<(), SinkError> {
        self.record(&job.id, "job_finished", |db| db.finish_scan(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::{Confidence, JobStatus, RiskLevel, ScanConfig, ScanTotals, TakeoverEvidence};

    fn sample_record() -> HostRecord {
        let mut r = HostRecord::new("shop.herokuapp.foo.com");
        r.ip = Some("192.0.2.1".into());
        r.http_status = Some(404);
        r.open_ports = [443u16, 80].into_iter().collect();
        r.vulnerabilities.push("Potential subdomain takeover: Heroku".into());
        r.fingerprints.insert("server".into(), "Cowboy".into());
        r.takeover.push(TakeoverEvidence::new("Heroku", Confidence::High, "no such app"));
        r.risk = RiskLevel::Critical;
        r
    }

    #[test]
    fn schema_is_created() {
        let db = Db::open_in_memory().unwrap();
        for t in ["scans", "scan_results", "errors"] {
            assert!(db.table_exists(t).unwrap(), "{t} missing");
        }
    }

    #[test]
    fn job_lifecycle_and_records_round_trip() {
        let sink = SqliteSink::from_db(Db::open_in_memory().unwrap());
        let mut job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        job.transition(JobStatus::Running).unwrap();
        sink.job_started(&job).unwrap();
        sink.progress(&ProgressUpdate { scan_id: job.id, progress: 35, status_hint: "liveness".into() }).unwrap();

        let record = sample_record();
        sink.persist_hosts(job.id, &[record.clone()]).unwrap();
        sink.persist_hosts(job.id, &[record.clone()]).unwrap();

        let totals = ScanTotals { harvested: 3, total_candidates: 2, live: 1, vulnerabilities: 1, high_risk: 1 };
        job.complete(totals).unwrap();
        sink.job_finished(&job).unwrap();

        let (scan, results) = sink
            .with_db(|db| Ok((db.scan(&job.id)?, db.results_for(&job.id)?)))
            .unwrap();
        let scan = scan.unwrap();
        assert_eq!(scan.status, "completed");
        assert_eq!(scan.progress, 100);
        assert_eq!(scan.live_count, 1);
        assert_eq!(results, vec![record]);
    }

    #[test]
    fn failed_write_is_logged_to_errors() {
        let sink = SqliteSink::from_db(Db::open_in_memory().unwrap());
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        sink.job_started(&job).unwrap();
        sink.with_db(|db| {
            db.conn.execute("DROP TABLE scan_results", [])?;
            Ok(())
        })
        .unwrap();

        assert!(sink.persist_hosts(job.id, &[sample_record()]).is_err());
        let errors = sink.with_db(|db| db.errors_for(&job.id)).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].scope, "persist_hosts");
    }

    #[test]
    fn progress_never_moves_backwards() {
        let db = Db::open_in_memory().unwrap();
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        db.begin_scan(&job).unwrap();
        db.update_progress(&job.id, 45).unwrap();
        db.update_progress(&job.id, 15).unwrap();
        assert_eq!(db.scan(&job.id).unwrap().unwrap().progress, 45);
        assert!(db.scan(&uuid::Uuid::now_v7()).unwrap().is_none());
    }
}
