//! Dangling-CNAME detection: hostnames that point at a hosting service whose
//! resource is no longer claimed.

use recon_core::http::{header_str, read_body_capped, BODY_SCAN_LIMIT};
use recon_core::{Confidence, TakeoverEvidence};
use reqwest::{Client, StatusCode};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct TakeoverSignature {
    pub name: &'static str,
    /// Substrings of the lower-cased hostname that point at this service.
    pub host_patterns: &'static [&'static str],
    /// Lower-case fragments of the service's unclaimed-resource page.
    pub body_signatures: &'static [&'static str],
    pub server_header: Option<&'static str>,
}

pub const SIGNATURES: &[TakeoverSignature] = &[
    TakeoverSignature {
        name: "Heroku",
        host_patterns: &["herokuapp", "herokudns", "herokussl"],
        body_signatures: &["no such app", "there's nothing here, yet", "herokucdn.com/error-pages/no-such-app"],
        server_header: None,
    },
    TakeoverSignature {
        name: "AWS S3",
        host_patterns: &["s3.amazonaws", "s3-website", ".s3."],
        body_signatures: &["nosuchbucket", "the specified bucket does not exist"],
        server_header: Some("amazons3"),
    },
    TakeoverSignature {
        name: "AWS CloudFront",
        host_patterns: &["cloudfront"],
        body_signatures: &["the request could not be satisfied", "bad request: we can't connect to the server"],
        server_header: Some("cloudfront"),
    },
    TakeoverSignature {
        name: "Azure",
        host_patterns: &["azurewebsites", "cloudapp", "trafficmanager", "blob.core.windows", "azureedge", "azure"],
        body_signatures: &["404 web site not found", "the resource you are looking for has been removed"],
        server_header: None,
    },
    TakeoverSignature {
        name: "GitHub Pages",
        host_patterns: &["github.io", "github"],
        body_signatures: &["there isn't a github pages site here", "for root urls (like http://example.com/) you must provide an index.html file"],
        server_header: Some("github.com"),
    },
    TakeoverSignature {
        name: "Firebase",
        host_patterns: &["firebaseapp", "web.app", "firebase"],
        body_signatures: &["site not found", "this site has been disabled"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Netlify",
        host_patterns: &["netlify"],
        body_signatures: &["not found - request id"],
        server_header: Some("netlify"),
    },
    TakeoverSignature {
        name: "Vercel",
        host_patterns: &["vercel", "now.sh"],
        body_signatures: &["deployment_not_found", "the deployment could not be found"],
        server_header: Some("vercel"),
    },
    TakeoverSignature {
        name: "Shopify",
        host_patterns: &["myshopify", "shopify"],
        body_signatures: &["sorry, this shop is currently unavailable", "only one step left"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Fastly",
        host_patterns: &["fastly"],
        body_signatures: &["fastly error: unknown domain"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Pantheon",
        host_patterns: &["pantheonsite", "pantheon"],
        body_signatures: &["the gods are wise", "404 error unknown site"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Surge",
        host_patterns: &["surge.sh"],
        body_signatures: &["project not found"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Ghost",
        host_patterns: &["ghost.io"],
        body_signatures: &["the thing you were looking for is no longer here"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Bitbucket",
        host_patterns: &["bitbucket.io"],
        body_signatures: &["repository not found"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Zendesk",
        host_patterns: &["zendesk"],
        body_signatures: &["help center closed"],
        server_header: None,
    },
    TakeoverSignature {
        name: "Unbounce",
        host_patterns: &["unbounce"],
        body_signatures: &["the requested url was not found on this server"],
        server_header: None,
    },
];

pub fn matching_signatures(hostname: &str) -> Vec<&'static TakeoverSignature> {
    let host = hostname.to_lowercase();
    SIGNATURES
        .iter()
        .filter(|s| s.host_patterns.iter().any(|p| host.contains(p)))
        .collect()
}

#[derive(Debug)]
struct Observed {
    status: StatusCode,
    server: Option<String>,
    body: String,
}

/// Check `hostname` against every signature whose pattern it contains,
/// fetching from `urls` (HTTPS first) once and reusing the first response.
pub async fn check(client: &Client, hostname: &str, urls: &[String]) -> Vec<TakeoverEvidence> {
    let candidates = matching_signatures(hostname);
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut last_error = String::from("no scheme attempted");
    let mut observed = None;
    for url in urls {
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let server = header_str(&resp, "server");
                let body = read_body_capped(resp, BODY_SCAN_LIMIT).await.unwrap_or_default();
                observed = Some(Observed { status, server, body });
                break;
            }
            Err(e) => {
                debug!("takeover fetch {} failed: {}", url, e);
                last_error = e.to_string();
            }
        }
    }

    candidates
        .into_iter()
        .filter_map(|sig| match &observed {
            Some(obs) => evaluate(sig, obs),
            None => Some(TakeoverEvidence::new(sig.name, Confidence::Low, &last_error)),
        })
        .collect()
}

fn evaluate(sig: &TakeoverSignature, obs: &Observed) -> Option<TakeoverEvidence> {
    if obs.status == StatusCode::NOT_FOUND {
        let body = obs.body.to_lowercase();
        if sig.body_signatures.iter().any(|s| body.contains(s)) {
            return Some(TakeoverEvidence::new(sig.name, Confidence::High, &obs.body));
        }
    }
    let expected = sig.server_header?;
    let server = obs.server.as_deref()?;
    server
        .to_lowercase()
        .contains(expected)
        .then(|| TakeoverEvidence::new(sig.name, Confidence::Medium, server))
}

/// The vulnerability line summarizing all evidence, if there is any.
pub fn vulnerability(evidence: &[TakeoverEvidence]) -> Option<String> {
    if evidence.is_empty() {
        return None;
    }
    let services: Vec<&str> = evidence.iter().map(|e| e.service.as_str()).collect();
    Some(format!("Potential subdomain takeover: {}", services.join(", ")))
}
