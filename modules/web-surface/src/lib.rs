//! HTTP fingerprinting of a live host: status, server software, framework
//! evidence, page title and favicon hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use recon_core::http::{header_str, read_body_capped, BODY_SCAN_LIMIT};
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;
use url::Url;

/// Response headers that name a technology outright.
pub const TECH_HEADERS: &[&str] = &[
    "x-powered-by",
    "x-aspnet-version",
    "x-aspnetmvc-version",
    "x-generator",
    "x-request-id",
    "via",
    "x-backend-server",
];

/// Priority-ordered `(tag, indicator)` body signatures; the first hit wins.
pub const BODY_SIGNATURES: &[(&str, &str)] = &[
    ("wordpress", "wp-content"),
    ("drupal", "drupal"),
    ("joomla", "joomla"),
    ("next.js", "__next_data__"),
    ("nuxt", "window.__nuxt"),
    ("react", "react"),
    ("angular", "angular"),
    ("vue", "vue.js"),
    ("laravel", "laravel"),
];

#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    /// The base URL that answered.
    pub base_url: String,
    pub status: u16,
    pub server: Option<String>,
    pub technologies: Vec<String>,
    pub fingerprints: BTreeMap<String, String>,
}

/// GET each base URL in order and fingerprint the first that answers.
/// Returns `None` when none of them could be reached.
pub async fn fingerprint(client: &Client, urls: &[String], fetch_favicon: bool) -> Option<Fingerprint> {
    for url in urls {
        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("fingerprint {} failed: {}", url, e);
                continue;
            }
        };

        let mut fp = Fingerprint { base_url: url.clone(), status: resp.status().as_u16(), ..Default::default() };
        if let Some(server) = header_str(&resp, "server") {
            fp.fingerprints.insert("server".into(), server.clone());
            fp.server = Some(server);
        }
        tech_from_headers(resp.headers(), &mut fp);

        let html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.contains("text/html"))
            .unwrap_or(false);
        if let Some(body) = read_body_capped(resp, BODY_SCAN_LIMIT).await {
            if html || body.to_lowercase().contains("<html") {
                if let Some(title) = extract_title(&body) {
                    fp.fingerprints.insert("title".into(), title);
                }
            }
            if let Some(tag) = tech_from_body(&body) {
                fp.technologies.push(tag.to_string());
                fp.fingerprints.insert("framework".into(), tag.to_string());
            }
        }

        if fetch_favicon {
            if let Some(hash) = favicon_hash(client, url).await {
                fp.fingerprints.insert("favicon_mmh3".into(), hash.to_string());
            }
        }
        return Some(fp);
    }
    None
}

fn tech_from_headers(headers: &HeaderMap, fp: &mut Fingerprint) {
    for name in TECH_HEADERS {
        if let Some(v) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            let v = v.trim();
            if v.is_empty() {
                continue;
            }
            fp.fingerprints.insert(name.to_string(), v.to_string());
            fp.technologies.push(v.to_string());
        }
    }
}

pub fn tech_from_body(body: &str) -> Option<&'static str> {
    let bl = body.to_lowercase();
    BODY_SIGNATURES.iter().find(|(_, indicator)| bl.contains(indicator)).map(|(tag, _)| *tag)
}

pub fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_lowercase();
    let start = lower.find("<title")?;
    let gt = start + lower[start..].find('>')?;
    let end = gt + 1 + lower[gt + 1..].find("</title>")?;
    let t = body.get(gt + 1..end)?.trim();
    (!t.is_empty()).then(|| t.to_string())
}

async fn favicon_hash(client: &Client, base: &str) -> Option<i32> {
    let url = Url::parse(base).ok()?.join("/favicon.ico").ok()?;
    let resp = client.get(url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let bytes = resp.bytes().await.ok()?;
    if bytes.is_empty() {
        return None;
    }
    mmh3_of(&bytes)
}

/// Shodan-style favicon hash: MurmurHash3-32 (seed 0) over the MIME
/// base64 encoding, read as a signed integer.
pub fn mmh3_of(bytes: &[u8]) -> Option<i32> {
    let encoded = mime_base64(bytes);
    murmur3::murmur3_32(&mut Cursor::new(encoded.as_bytes()), 0).ok().map(|h| h as i32)
}

fn mime_base64(bytes: &[u8]) -> String {
    let flat = STANDARD.encode(bytes);
    let mut out = String::with_capacity(flat.len() + flat.len() / 76 + 1);
    for line in flat.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn title_is_extracted_case_insensitively() {
        assert_eq!(extract_title("<html><TITLE> Admin Login </TITLE></html>"), Some("Admin Login".into()));
        assert_eq!(extract_title("<title></title>"), None);
        assert_eq!(extract_title("no markup"), None);
    }

    #[test]
    fn first_body_signature_wins() {
        assert_eq!(tech_from_body("<link href='/wp-content/x.css'> react"), Some("wordpress"));
        assert_eq!(tech_from_body("<script src=vue.js>"), Some("vue"));
        assert_eq!(tech_from_body("plain text"), None);
    }

    #[test]
    fn mime_lines_are_wrapped_at_76() {
        let encoded = mime_base64(&[0u8; 100]);
        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert!(encoded.ends_with('\n'));
    }

    #[tokio::test]
    async fn headers_and_body_become_fingerprints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("server", "nginx/1.25")
                    .insert_header("x-powered-by", "PHP/8.2")
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><title>Blog</title><link href=/wp-content/a.css></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let fp = fingerprint(&Client::new(), &[server.uri()], true).await.unwrap();
        assert_eq!(fp.status, 200);
        assert_eq!(fp.server.as_deref(), Some("nginx/1.25"));
        assert_eq!(fp.technologies, vec!["PHP/8.2", "wordpress"]);
        assert_eq!(fp.fingerprints["framework"], "wordpress");
        assert_eq!(fp.fingerprints["title"], "Blog");
        assert_eq!(fp.fingerprints["favicon_mmh3"], mmh3_of(&[1, 2, 3]).unwrap().to_string());
    }

    #[tokio::test]
    async fn falls_through_to_next_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;
        let urls = vec!["http://127.0.0.1:1".to_string(), server.uri()];

        let fp = fingerprint(&Client::new(), &urls, false).await.unwrap();
        assert_eq!(fp.base_url, server.uri());
        assert_eq!(fp.status, 503);
        assert!(!fp.fingerprints.contains_key("favicon_mmh3"));
    }

    #[tokio::test]
    async fn unreachable_everywhere_is_none() {
        let urls = vec!["http://127.0.0.1:1".to_string()];
        assert!(fingerprint(&Client::new(), &urls, false).await.is_none());
    }
}
