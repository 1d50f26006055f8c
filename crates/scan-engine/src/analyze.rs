//! Deep analysis of a single live host.

use crate::options::EngineOptions;
use recon_core::{risk, HostRecord, ReconError, ScanConfig};
use reqwest::Client;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::debug;

pub async fn analyze_host(
    client: &Client,
    host: &str,
    config: &ScanConfig,
    opts: &EngineOptions,
    cloud_findings: Vec<String>,
) -> Result<HostRecord, ReconError> {
    let urls = (opts.base_urls)(host);
    if urls.is_empty() {
        return Err(ReconError::Analysis { host: host.to_string(), reason: "no base URL to request".into() });
    }

    let mut record = HostRecord::new(host);
    record.ip = resolve(host, opts.resolve_timeout).await;

    let mut cors_base = urls[0].clone();
    if let Some(fp) = web_surface::fingerprint(client, &urls, config.fetch_favicon).await {
        record.http_status = Some(fp.status);
        record.server_header = fp.server;
        record.technologies = fp.technologies;
        record.fingerprints = fp.fingerprints;
        cors_base = fp.base_url;
    }

    if config.enable_port_scan {
        record.open_ports = port_scan::probe_ports(client, host, &opts.ports, opts.port_timeout, opts.port_concurrency).await;
    }

    if config.enable_cors_check {
        let report = cors_audit::audit(client, &cors_base, host).await;
        record.cors_issues = report.issues;
        record.vulnerabilities.extend(report.vulnerabilities);
    }

    if config.enable_takeover_check {
        let evidence = takeover::check(client, host, &urls).await;
        record.vulnerabilities.extend(takeover::vulnerability(&evidence));
        record.takeover = evidence;
    }

    record.cloud_findings = cloud_findings;
    record.risk = risk::classify(&record);
    debug!("{} analyzed: risk {} (score {})", host, record.risk, risk::score(&record));
    Ok(record)
}

/// Best effort; the first address the system resolver returns.
pub async fn resolve(host: &str, limit: Duration) -> Option<String> {
    match timeout(limit, lookup_host((host, 0))).await {
        Ok(Ok(mut addrs)) => addrs.next().map(|a| a.ip().to_string()),
        _ => None,
    }
}
