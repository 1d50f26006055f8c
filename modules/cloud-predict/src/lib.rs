//! Managed-hosting recognition and speculative sibling probing.

use once_cell::sync::Lazy;
use recon_core::batch::run_batches;
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::debug;

static PROVIDER_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("AWS S3", r"^[a-z0-9.-]+\.s3\.amazonaws\.com$"),
        ("AWS S3", r"^[a-z0-9.-]+\.s3[.-][a-z0-9-]+\.amazonaws\.com$"),
        ("Azure Blob Storage", r"^[a-z0-9-]+\.blob\.core\.windows\.net$"),
        ("Google Cloud Storage", r"^[a-z0-9._-]+\.storage\.googleapis\.com$"),
        ("Heroku", r"^[a-z0-9-]+\.herokuapp\.com$"),
        ("Azure App Service", r"^[a-z0-9-]+\.azurewebsites\.net$"),
        ("Netlify", r"^[a-z0-9-]+\.netlify\.app$"),
        ("Vercel", r"^[a-z0-9-]+\.vercel\.app$"),
        ("Firebase Hosting", r"^[a-z0-9-]+\.web\.app$"),
        ("Firebase Hosting", r"^[a-z0-9-]+\.firebaseapp\.com$"),
        ("Shopify", r"^[a-z0-9-]+\.myshopify\.com$"),
        ("GitHub Pages", r"^[a-z0-9-]+\.github\.io$"),
        ("AWS CloudFront", r"^[a-z0-9]+\.cloudfront\.net$"),
    ]
    .into_iter()
    .map(|(name, re)| (name, Regex::new(re).unwrap()))
    .collect()
});

const SIBLING_PREFIXES: &[&str] = &["api", "dev", "staging"];

#[derive(Debug, Clone)]
pub struct PredictOptions {
    pub probe_timeout: Duration,
    pub concurrency: usize,
    /// Send every probe to this base URL with the candidate as `Host`
    /// instead of resolving the candidate.
    pub probe_via: Option<String>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        PredictOptions { probe_timeout: Duration::from_secs(3), concurrency: 20, probe_via: None }
    }
}

/// Providers whose naming shape `host` matches, each listed once.
pub fn match_patterns(host: &str) -> Vec<&'static str> {
    let host = host.to_lowercase();
    let mut seen = BTreeSet::new();
    PROVIDER_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(&host))
        .map(|(name, _)| *name)
        .filter(|name| seen.insert(*name))
        .collect()
}

pub fn predicted_candidates(host: &str) -> Vec<String> {
    let host = host.to_lowercase();
    let first = host.split('.').next().unwrap_or_default();
    let mut out: Vec<String> = SIBLING_PREFIXES.iter().map(|p| format!("{}.{}", p, host)).collect();
    if !first.is_empty() {
        out.push(format!("{}.s3.amazonaws.com", first));
        out.push(format!("{}.blob.core.windows.net", first));
        out.push(format!("{}.storage.googleapis.com", first));
    }
    out.retain(|c| c != &host);
    out.dedup();
    out
}

/// A candidate exists when anything other than a 404 comes back.
pub async fn probe_candidate(client: &Client, candidate: &str, opts: &PredictOptions) -> bool {
    let req = match &opts.probe_via {
        Some(base) => client.head(format!("{}/", base.trim_end_matches('/'))).header(header::HOST, candidate),
        None => client.head(format!("https://{}/", candidate)),
    };
    match timeout(opts.probe_timeout, req.send()).await {
        Ok(Ok(resp)) => resp.status() != StatusCode::NOT_FOUND,
        _ => false,
    }
}

pub async fn findings_for(client: &Client, host: &str, opts: &PredictOptions) -> Vec<String> {
    let mut findings: Vec<String> = match_patterns(host)
        .into_iter()
        .map(|p| format!("Matched provider pattern: {}", p))
        .collect();

    let mut set = JoinSet::new();
    for candidate in predicted_candidates(host) {
        let client = client.clone();
        let opts = opts.clone();
        set.spawn(async move {
            let exists = probe_candidate(&client, &candidate, &opts).await;
            (candidate, exists)
        });
    }
    let mut existing = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok((candidate, true)) = joined {
            existing.push(candidate);
        }
    }
    existing.sort();
    findings.extend(existing.into_iter().map(|c| format!("Predicted endpoint exists: {}", c)));
    findings
}

/// Findings keyed by hostname; hosts with nothing to report are omitted.
pub async fn predict(client: &Client, live: &BTreeSet<String>, opts: &PredictOptions) -> BTreeMap<String, Vec<String>> {
    let results = run_batches(
        live.iter().cloned().collect(),
        opts.concurrency,
        |host| {
            let client = client.clone();
            let opts = opts.clone();
            async move {
                let findings = findings_for(&client, &host, &opts).await;
                Ok::<_, Infallible>((host, findings))
            }
        },
        |p, _| debug!("cloud prediction: {}/{} hosts", p.done, p.total),
    )
    .await;

    results.into_iter().filter(|(_, f)| !f.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn provider_shapes() {
        assert_eq!(match_patterns("assets.s3.amazonaws.com"), vec!["AWS S3"]);
        assert_eq!(match_patterns("logs.s3.eu-west-1.amazonaws.com"), vec!["AWS S3"]);
        assert_eq!(match_patterns("shop-foo.myshopify.com"), vec!["Shopify"]);
        assert_eq!(match_patterns("d111111abcdef8.cloudfront.net"), vec!["AWS CloudFront"]);
        assert!(match_patterns("www.foo.com").is_empty());
        assert!(match_patterns("herokuapp.com.foo.com").is_empty());
    }

    #[test]
    fn candidates_cover_siblings_and_storage() {
        let c = predicted_candidates("media.foo.com");
        assert!(c.contains(&"api.media.foo.com".to_string()));
        assert!(c.contains(&"staging.media.foo.com".to_string()));
        assert!(c.contains(&"media.s3.amazonaws.com".to_string()));
        assert!(c.contains(&"media.blob.core.windows.net".to_string()));
        assert!(c.contains(&"media.storage.googleapis.com".to_string()));
        assert_eq!(c.len(), 6);
    }

    #[tokio::test]
    async fn only_non_404_candidates_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(header_is("host", "api.media.foo.com"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let opts = PredictOptions { probe_via: Some(server.uri()), ..Default::default() };
        let findings = findings_for(&Client::new(), "media.foo.com", &opts).await;
        assert_eq!(findings, vec!["Predicted endpoint exists: api.media.foo.com"]);
    }

    #[tokio::test]
    async fn quiet_hosts_are_left_out() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        let opts = PredictOptions { probe_via: Some(server.uri()), ..Default::default() };
        let live: BTreeSet<String> = ["a.foo.com", "foo-app.herokuapp.com"].iter().map(|s| s.to_string()).collect();

        let map = predict(&Client::new(), &live, &opts).await;
        assert_eq!(map.len(), 1);
        assert_eq!(map["foo-app.herokuapp.com"], vec!["Matched provider pattern: Heroku"]);
    }
}
