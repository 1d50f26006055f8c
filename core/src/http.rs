//! Shared HTTP client construction and response helpers.

use crate::error::ReconError;
use rand::seq::SliceRandom;
use rand::thread_rng;
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15",
];

/// Body bytes inspected by any analyzer.
pub const BODY_SCAN_LIMIT: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions { timeout: Duration::from_secs(10), accept_invalid_certs: false, user_agent: None }
    }
}

pub fn random_user_agent() -> &'static str {
    USER_AGENTS.choose(&mut thread_rng()).copied().unwrap_or(USER_AGENTS[0])
}

/// Redirects are never followed: every analyzer wants the host's own answer.
pub fn build_client(opts: &ClientOptions) -> Result<Client, ReconError> {
    let ua = opts.user_agent.clone().unwrap_or_else(|| random_user_agent().to_string());
    let client = Client::builder()
        .redirect(Policy::none())
        .timeout(opts.timeout)
        .user_agent(ua)
        .danger_accept_invalid_certs(opts.accept_invalid_certs)
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .brotli(true)
        .gzip(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// HTTPS first, then HTTP.
pub fn base_urls(host: &str) -> Vec<String> {
    vec![format!("https://{}", host), format!("http://{}", host)]
}

pub fn header_str(resp: &Response, name: &str) -> Option<String> {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string())
}

/// Read at most `cap` bytes of the body. Returns `None` only when nothing
/// could be read at all.
pub async fn read_body_capped(mut resp: Response, cap: usize) -> Option<String> {
    let mut buf = Vec::new();
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                buf.extend_from_slice(&chunk);
                if buf.len() >= cap {
                    buf.truncate(cap);
                    break;
                }
            }
            Ok(None) => break,
            Err(_) if buf.is_empty() => return None,
            Err(_) => break,
        }
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}
