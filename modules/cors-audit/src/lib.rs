//! Replays a fixed set of hostile origins against a base URL and classifies
//! the CORS headers that come back.

use recon_core::http::{header_str, read_body_capped, BODY_SCAN_LIMIT};
use reqwest::{header, Client};
use std::time::Duration;
use tracing::debug;

pub const STATIC_ORIGINS: &[&str] = &["https://evil.com", "http://evil.com", "null", "https://attacker.example"];

pub const SENSITIVE_KEYWORDS: &[&str] =
    &["password", "token", "api_key", "apikey", "secret", "ssn", "credit_card", "iban"];

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsReport {
    pub issues: Vec<String>,
    pub vulnerabilities: Vec<String>,
}

/// The static origins plus `https://<host>.evil.com`, which catches
/// validators that only check for the target name as a prefix.
pub fn hostile_origins(host: &str) -> Vec<String> {
    let mut origins: Vec<String> = STATIC_ORIGINS.iter().map(|o| o.to_string()).collect();
    origins.push(format!("https://{}.evil.com", host));
    origins
}

pub async fn audit(client: &Client, base_url: &str, host: &str) -> CorsReport {
    let mut report = CorsReport::default();
    for origin in hostile_origins(host) {
        let resp = match client
            .get(base_url)
            .header(header::ORIGIN, origin.as_str())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("CORS probe {} with origin {} inconclusive: {}", base_url, origin, e);
                continue;
            }
        };

        let allow_origin = header_str(&resp, "access-control-allow-origin");
        let allow_credentials = header_str(&resp, "access-control-allow-credentials")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let permissive = match allow_origin.as_deref() {
            Some("*") => {
                report.issues.push("CORS wildcard origin allowed".into());
                report
                    .vulnerabilities
                    .push("CORS misconfiguration allows cross-origin requests from any origin (wildcard)".into());
                true
            }
            Some(acao) if acao == origin => {
                report.issues.push(format!("Reflects origin: {}", origin));
                report.vulnerabilities.push(format!("CORS reflects arbitrary origin {}", origin));
                if let Some(body) = read_body_capped(resp, BODY_SCAN_LIMIT).await {
                    if let Some(kw) = sensitive_keyword(&body) {
                        report.vulnerabilities.push(format!("CORS exposes sensitive data: {}", kw));
                    }
                }
                true
            }
            _ => false,
        };

        if permissive && allow_credentials {
            report.issues.push("CORS allows credentials (Allow-Credentials: true)".into());
            report.vulnerabilities.push("CORS allows credentials with permissive origin".into());
        }
    }
    report
}

pub fn sensitive_keyword(body: &str) -> Option<&'static str> {
    let bl = body.to_lowercase();
    SENSITIVE_KEYWORDS.iter().find(|kw| bl.contains(*kw)).copied()
}
