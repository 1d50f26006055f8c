use crate::{Db, ErrorRow, ScanRow};
use anyhow::{anyhow, Result};
use recon_core::{HostRecord, RiskLevel};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn scan(&self, scan_id: &Uuid) -> Result<Option<ScanRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT scan_id, domain, status, progress, harvested, total_candidates, live_count, vulnerabilities, high_risk, started_at, completed_at, error
                 FROM scans WHERE scan_id=?",
                [scan_id.to_string()],
                |r| {
                    Ok(ScanRow {
                        scan_id: r.get(0)?,
                        domain: r.get(1)?,
                        status: r.get(2)?,
                        progress: r.get(3)?,
                        harvested: r.get(4)?,
                        total_candidates: r.get(5)?,
                        live_count: r.get(6)?,
                        vulnerabilities: r.get(7)?,
                        high_risk: r.get(8)?,
                        started_at: r.get(9)?,
                        completed_at: r.get(10)?,
                        error: r.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Host records of one scan, ordered by hostname.
    pub fn results_for(&self, scan_id: &Uuid) -> Result<Vec<HostRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT hostname, ip, http_status, server_header, risk, open_ports_json, cors_issues_json, technologies_json,
                    vulnerabilities_json, fingerprints_json, takeover_json, cloud_findings_json
             FROM scan_results WHERE scan_id=? ORDER BY hostname",
        )?;
        let rows = stmt.query_map(params![scan_id.to_string()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, String>(4)?,
                [
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, String>(9)?,
                    r.get::<_, String>(10)?,
                    r.get::<_, String>(11)?,
                ],
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (hostname, ip, status, server, risk, json) = row?;
            let [ports, cors, tech, vulns, fps, takeover, cloud] = json;
            let mut rec = HostRecord::new(&hostname);
            rec.ip = ip;
            rec.http_status = status.and_then(|s| u16::try_from(s).ok());
            rec.server_header = server;
            rec.risk = risk.parse::<RiskLevel>().map_err(|e| anyhow!(e))?;
            rec.open_ports = serde_json::from_str(&ports)?;
            rec.cors_issues = serde_json::from_str(&cors)?;
            rec.technologies = serde_json::from_str(&tech)?;
            rec.vulnerabilities = serde_json::from_str(&vulns)?;
            rec.fingerprints = serde_json::from_str(&fps)?;
            rec.takeover = serde_json::from_str(&takeover)?;
            rec.cloud_findings = serde_json::from_str(&cloud)?;
            out.push(rec);
        }
        Ok(out)
    }

    pub fn errors_for(&self, scan_id: &Uuid) -> Result<Vec<ErrorRow>> {
        let mut stmt = self.conn.prepare("SELECT scope, code, message, at_ms FROM errors WHERE scan_id=? ORDER BY error_id")?;
        let rows = stmt.query_map(params![scan_id.to_string()], |r| {
            Ok(ErrorRow { scope: r.get(0)?, code: r.get(1)?, message: r.get(2)?, at_ms: r.get(3)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
