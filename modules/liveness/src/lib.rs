//! Liveness as the union of three independent checks: HTTPS HEAD, HTTP HEAD
//! and a DNS-over-HTTPS lookup. Any one of them is enough to keep a host.

use recon_core::batch::run_batches;
use reqwest::{header, Client};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google";

#[derive(Debug, Clone)]
pub struct LivenessOptions {
    pub doh_endpoint: String,
    pub check_timeout: Duration,
    pub concurrency: usize,
}

impl Default for LivenessOptions {
    fn default() -> Self {
        LivenessOptions {
            doh_endpoint: DEFAULT_DOH_ENDPOINT.to_string(),
            check_timeout: Duration::from_secs(5),
            concurrency: 20,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessChecks {
    pub https: bool,
    pub http: bool,
    pub dns: bool,
}

impl LivenessChecks {
    pub fn is_live(&self) -> bool {
        self.https || self.http || self.dns
    }
}

/// Any HTTP response, whatever the status, counts as a confirmation.
pub async fn head_responds(client: &Client, url: &str, limit: Duration) -> bool {
    matches!(timeout(limit, client.head(url).send()).await, Ok(Ok(_)))
}

pub async fn doh_resolves(client: &Client, endpoint: &str, host: &str, limit: Duration) -> bool {
    let url = format!("{}/resolve", endpoint.trim_end_matches('/'));
    let lookup = async {
        let resp = client
            .get(&url)
            .query(&[("name", host), ("type", "A")])
            .header(header::ACCEPT, "application/dns-json")
            .send()
            .await?;
        resp.json::<DohResponse>().await
    };
    match timeout(limit, lookup).await {
        Ok(Ok(answer)) => {
            if let Some(first) = answer.answer.first() {
                debug!("{} resolves via DoH ({})", host, first.data);
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

pub async fn check_host(client: &Client, host: &str, opts: &LivenessOptions) -> LivenessChecks {
    let https_url = format!("https://{}", host);
    let http_url = format!("http://{}", host);
    let (https, http, dns) = tokio::join!(
        head_responds(client, &https_url, opts.check_timeout),
        head_responds(client, &http_url, opts.check_timeout),
        doh_resolves(client, &opts.doh_endpoint, host, opts.check_timeout),
    );
    LivenessChecks { https, http, dns }
}

/// Returns the subset of `hosts` confirmed live by at least one check.
pub async fn probe_live(client: &Client, hosts: &BTreeSet<String>, opts: &LivenessOptions) -> BTreeSet<String> {
    let checked = run_batches(
        hosts.iter().cloned().collect(),
        opts.concurrency,
        |host| {
            let client = client.clone();
            let opts = opts.clone();
            async move {
                let checks = check_host(&client, &host, &opts).await;
                Ok::<_, Infallible>((host, checks))
            }
        },
        |p, _| debug!("liveness: {}/{} hosts checked", p.done, p.total),
    )
    .await;

    checked.into_iter().filter(|(_, c)| c.is_live()).map(|(h, _)| h).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn doh_server(answer_for: Option<&str>) -> MockServer {
        let server = MockServer::start().await;
        if let Some(name) = answer_for {
            Mock::given(method("GET"))
                .and(path("/resolve"))
                .and(query_param("name", name))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    r#"{"Status":0,"Answer":[{"name":"x","type":1,"TTL":60,"data":"203.0.113.7"}]}"#,
                ))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Status":3}"#))
            .mount(&server)
            .await;
        server
    }

    fn opts(doh: &MockServer) -> LivenessOptions {
        LivenessOptions { doh_endpoint: doh.uri(), check_timeout: Duration::from_secs(2), concurrency: 4 }
    }

    #[tokio::test]
    async fn plain_http_host_is_live() {
        let web = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(403)).mount(&web).await;
        let doh = doh_server(None).await;
        let host = web.address().to_string();

        let checks = check_host(&Client::new(), &host, &opts(&doh)).await;
        assert!(checks.http);
        assert!(!checks.https);
        assert!(!checks.dns);
        assert!(checks.is_live());
    }

    #[tokio::test]
    async fn resolving_host_is_live_without_http() {
        let doh = doh_server(Some("only-dns.invalid")).await;
        let checks = check_host(&Client::new(), "only-dns.invalid", &opts(&doh)).await;
        assert!(checks.dns);
        assert!(!checks.http);
        assert!(checks.is_live());
    }

    #[tokio::test]
    async fn live_set_is_subset_of_input() {
        let web = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(200)).mount(&web).await;
        let doh = doh_server(None).await;
        let alive = web.address().to_string();
        let hosts: BTreeSet<String> = [alive.clone(), "gone.invalid".to_string()].into_iter().collect();

        let live = probe_live(&Client::new(), &hosts, &opts(&doh)).await;
        assert!(live.is_subset(&hosts));
        assert_eq!(live.into_iter().collect::<Vec<_>>(), vec![alive]);
    }
}
