//! Candidate hostnames from certificate transparency (crt.sh JSON API).
//!
//! Enumeration failure is never fatal: after the last retriable attempt the
//! harvester hands back an empty set and the scan carries on.

use rand::{thread_rng, Rng};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://crt.sh";

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub endpoint: String,
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles on each further failure.
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        HarvestOptions {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
}

#[derive(Debug)]
enum AttemptError {
    Retriable(String),
    Fatal(String),
}

pub async fn harvest(client: &Client, domain: &str, opts: &HarvestOptions) -> BTreeSet<String> {
    let attempts = opts.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_once(client, domain, opts).await {
            Ok(names) => {
                info!("crt.sh returned {} names for {}", names.len(), domain);
                return names;
            }
            Err(AttemptError::Fatal(msg)) => {
                warn!("crt.sh query for {} failed, not retrying: {}", domain, msg);
                return BTreeSet::new();
            }
            Err(AttemptError::Retriable(msg)) => {
                if attempt >= attempts {
                    warn!("crt.sh query for {} gave up after {} attempts: {}", domain, attempt, msg);
                    return BTreeSet::new();
                }
                let delay = backoff_delay(opts.base_delay, attempt);
                debug!("crt.sh attempt {}/{} failed ({}), retrying in {:?}", attempt, attempts, msg, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// `base * 2^(attempt-1)` plus up to 25% jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
    Duration::from_millis(exp + jitter)
}

async fn fetch_once(client: &Client, domain: &str, opts: &HarvestOptions) -> Result<BTreeSet<String>, AttemptError> {
    let url = format!("{}/", opts.endpoint.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .query(&[("q", format!("%.{}", domain).as_str()), ("output", "json")])
        .header(header::ACCEPT, "application/json")
        .header(header::USER_AGENT, recon_core::http::random_user_agent())
        .timeout(opts.timeout)
        .send()
        .await
        .map_err(classify)?;

    let status = resp.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::Retriable(format!("status {}", status)));
    }
    if !status.is_success() {
        return Err(AttemptError::Fatal(format!("status {}", status)));
    }
    let entries: Vec<CrtShEntry> = resp.json().await.map_err(classify)?;
    Ok(collect_names(&entries))
}

fn classify(e: reqwest::Error) -> AttemptError {
    if e.is_decode() {
        AttemptError::Fatal(e.to_string())
    } else {
        AttemptError::Retriable(e.to_string())
    }
}

fn collect_names(entries: &[CrtShEntry]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for entry in entries {
        for name in entry.name_value.split('\n') {
            let n = name.trim().to_lowercase();
            if !n.is_empty() && !n.starts_with('*') {
                names.insert(n);
            }
        }
    }
    names
}
