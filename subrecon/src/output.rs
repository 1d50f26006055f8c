use anyhow::Result;
use recon_core::{HostRecord, ScanJob};
use std::io::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn rfc3339_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

fn join_ports(r: &HostRecord) -> String {
    r.open_ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
}

fn sorted(records: &[HostRecord]) -> Vec<&HostRecord> {
    let mut v: Vec<&HostRecord> = records.iter().collect();
    v.sort_by(|a, b| b.risk.cmp(&a.risk).then_with(|| a.hostname.cmp(&b.hostname)));
    v
}

pub fn write_text<W: Write>(w: &mut W, job: &ScanJob, records: &[HostRecord]) -> Result<()> {
    writeln!(
        w,
        "scan {} {} [{}] started {}",
        job.id,
        job.domain,
        job.status,
        rfc3339_ms(job.started_at)
    )?;
    for r in sorted(records) {
        let status = r.http_status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        writeln!(w, "{:<9} {:<40} {:>4}  ports=[{}]", r.risk, r.hostname, status, join_ports(r))?;
        for v in &r.vulnerabilities {
            writeln!(w, "          ! {}", v)?;
        }
        for c in &r.cloud_findings {
            writeln!(w, "          ~ {}", c)?;
        }
    }
    let t = &job.totals;
    writeln!(
        w,
        "harvested={} candidates={} live={} vulnerabilities={} high_risk={}",
        t.harvested, t.total_candidates, t.live, t.vulnerabilities, t.high_risk
    )?;
    if let Some(e) = &job.error {
        writeln!(w, "error: {}", e)?;
    }
    Ok(())
}

pub fn write_json<W: Write>(w: &mut W, job: &ScanJob, records: &[HostRecord]) -> Result<()> {
    let obj = serde_json::json!({
        "scan": job,
        "started_at": rfc3339_ms(job.started_at),
        "completed_at": job.completed_at.map(rfc3339_ms),
        "results": sorted(records),
    });
    serde_json::to_writer_pretty(&mut *w, &obj)?;
    writeln!(w)?;
    Ok(())
}

/// One line per host, then a closing line with the job summary.
pub fn write_jsonl<W: Write>(w: &mut W, job: &ScanJob, records: &[HostRecord]) -> Result<()> {
    for r in sorted(records) {
        let obj = serde_json::json!({ "scan_id": job.id, "host": r });
        writeln!(w, "{}", serde_json::to_string(&obj)?)?;
    }
    let summary = serde_json::json!({
        "scan_id": job.id,
        "status": job.status,
        "totals": job.totals,
        "error": job.error,
    });
    writeln!(w, "{}", serde_json::to_string(&summary)?)?;
    Ok(())
}

pub fn write_csv<W: Write>(w: W, records: &[HostRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record([
        "hostname", "ip", "status", "server", "risk", "open_ports", "technologies", "cors_issues",
        "vulnerabilities", "takeover", "cloud_findings",
    ])?;
    for r in sorted(records) {
        let takeover: Vec<String> =
            r.takeover.iter().map(|e| format!("{}:{:?}", e.service, e.confidence)).collect();
        wtr.write_record([
            r.hostname.clone(),
            r.ip.clone().unwrap_or_default(),
            r.http_status.map(|v| v.to_string()).unwrap_or_default(),
            r.server_header.clone().unwrap_or_default(),
            r.risk.to_string(),
            join_ports(r),
            r.technologies.join("|"),
            r.cors_issues.join("|"),
            r.vulnerabilities.join("|"),
            takeover.join("|"),
            r.cloud_findings.join("|"),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::{RiskLevel, ScanConfig};

    fn records() -> Vec<HostRecord> {
        let mut low = HostRecord::new("a.foo.com");
        low.open_ports = [80u16, 443].into_iter().collect();
        let mut crit = HostRecord::new("z.foo.com");
        crit.risk = RiskLevel::Critical;
        crit.vulnerabilities.push("Potential subdomain takeover: Heroku".into());
        vec![low, crit]
    }

    #[test]
    fn text_lists_riskiest_first() {
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        let mut buf = Vec::new();
        write_text(&mut buf, &job, &records()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let z = out.find("z.foo.com").unwrap();
        let a = out.find("a.foo.com").unwrap();
        assert!(z < a);
        assert!(out.contains("ports=[80,443]"));
        assert!(out.contains("! Potential subdomain takeover: Heroku"));
    }

    #[test]
    fn jsonl_ends_with_summary() {
        let job = ScanJob::new(ScanConfig::for_domain("foo.com"));
        let mut buf = Vec::new();
        write_jsonl(&mut buf, &job, &records()).unwrap();
        let lines: Vec<serde_json::Value> =
            String::from_utf8(buf).unwrap().lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["host"]["hostname"], "z.foo.com");
        assert_eq!(lines[2]["status"], "pending");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &records()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("hostname,ip,status"));
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("a.foo.com,,,,low,\"80,443\""));
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(rfc3339_ms(0), "1970-01-01T00:00:00Z");
    }
}
