use crate::Db;
use anyhow::Result;
use recon_core::{HostRecord, ScanJob};
use rusqlite::params;
use uuid::Uuid;

impl Db {
    pub fn begin_scan(&self, job: &ScanJob) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scans(scan_id, domain, status, progress, config_json, tool_version, started_at) VALUES (?,?,?,?,?,?,?)
             ON CONFLICT(scan_id) DO UPDATE SET status=excluded.status, progress=excluded.progress",
            params![
                job.id.to_string(),
                job.domain,
                job.status.as_str(),
                job.progress as i64,
                serde_json::to_string(&job.config)?,
                recon_core::version(),
                job.started_at
            ],
        )?;
        Ok(())
    }

    pub fn update_progress(&self, scan_id: &Uuid, progress: u8) -> Result<()> {
        self.conn.execute(
            "UPDATE scans SET progress=MAX(progress, ?) WHERE scan_id=?",
            params![progress as i64, scan_id.to_string()],
        )?;
        Ok(())
    }

    pub fn finish_scan(&self, job: &ScanJob) -> Result<()> {
        let t = &job.totals;
        self.conn.execute(
            "UPDATE scans SET status=?, progress=?, harvested=?, total_candidates=?, live_count=?, vulnerabilities=?, high_risk=?, completed_at=?, error=? WHERE scan_id=?",
            params![
                job.status.as_str(),
                job.progress as i64,
                t.harvested as i64,
                t.total_candidates as i64,
                t.live as i64,
                t.vulnerabilities as i64,
                t.high_risk as i64,
                job.completed_at,
                job.error,
                job.id.to_string()
            ],
        )?;
        Ok(())
    }

    /// Insert a batch of records in one transaction. A hostname already
    /// stored for the scan is left untouched. Returns the rows written.
    pub fn insert_results(&self, scan_id: &Uuid, records: &[HostRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scan_results(scan_id, hostname, ip, http_status, server_header, risk, open_ports_json, cors_issues_json,
                    technologies_json, vulnerabilities_json, fingerprints_json, takeover_json, cloud_findings_json)
                 VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)
                 ON CONFLICT(scan_id, hostname) DO NOTHING",
            )?;
            for r in records {
                written += stmt.execute(params![
                    scan_id.to_string(),
                    r.hostname,
                    r.ip,
                    r.http_status.map(i64::from),
                    r.server_header,
                    r.risk.as_str(),
                    serde_json::to_string(&r.open_ports)?,
                    serde_json::to_string(&r.cors_issues)?,
                    serde_json::to_string(&r.technologies)?,
                    serde_json::to_string(&r.vulnerabilities)?,
                    serde_json::to_string(&r.fingerprints)?,
                    serde_json::to_string(&r.takeover)?,
                    serde_json::to_string(&r.cloud_findings)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn add_error(&self, scan_id: &Uuid, scope: &str, code: &str, message: &str, at_ms: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO errors(scan_id,scope,code,message,at_ms) VALUES (?,?,?,?,?)",
            params![scan_id.to_string(), scope, code, message, at_ms],
        )?;
        Ok(())
    }
}
