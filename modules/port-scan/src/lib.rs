//! Application-layer port probing: one HTTP(S) GET per port.

use anyhow::{anyhow, Result};
use reqwest::Client;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::debug;

/// Ports probed on every live host unless configured otherwise.
pub const COMMON_PORTS: &[u16] = &[21, 22, 25, 80, 443, 3306, 3389, 5432, 8080, 8443, 9200, 9300, 27017];

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Ports probed at once for a single host.
pub const DEFAULT_PORT_CONCURRENCY: usize = 32;

/// Parse a comma-separated list of ports/ranges (e.g., "22,80,443", "1-1024,8080").
pub fn parse_ports(list: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in list.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start.trim().parse()?;
            let e: u16 = end.trim().parse()?;
            if s == 0 || e == 0 || s > e {
                return Err(anyhow!("invalid port range: {}", part));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part.parse()?;
            if p == 0 {
                return Err(anyhow!("invalid port: {}", part));
            }
            ports.push(p);
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

pub fn scheme_for(port: u16) -> &'static str {
    match port {
        443 | 8443 => "https",
        _ => "http",
    }
}

pub async fn probe_port(client: &Client, host: &str, port: u16, per_port: Duration) -> bool {
    probe_with_scheme(client, host, port, scheme_for(port), per_port).await
}

/// Open when a response comes back, or when the request failed after the TCP
/// connection was made: a TLS handshake against a plain listener, a bad
/// certificate or a non-HTTP banner all count. Closed when the connect fails
/// or nothing answers in `per_port`.
pub async fn probe_with_scheme(client: &Client, host: &str, port: u16, scheme: &str, per_port: Duration) -> bool {
    let url = format!("{}://{}:{}/", scheme, host, port);
    let attempt = async {
        if TcpStream::connect((host, port)).await.is_err() {
            return false;
        }
        match client.get(&url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("{}: {}", url, e);
                !e.is_timeout()
            }
        }
    };
    timeout(per_port, attempt).await.unwrap_or(false)
}

/// Probe `ports` with at most `limit` in flight; returns the open ones, ascending.
pub async fn probe_ports(client: &Client, host: &str, ports: &[u16], per_port: Duration, limit: usize) -> BTreeSet<u16> {
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for &port in ports {
        let sem = sem.clone();
        let client = client.clone();
        let host = host.to_string();
        set.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return None;
            };
            probe_port(&client, &host, port, per_port).await.then_some(port)
        });
    }

    let mut open = BTreeSet::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(Some(p)) = joined {
            open.insert(p);
        }
    }
    debug!("{}: {} of {} ports open", host, open.len(), ports.len());
    open
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wiremock::matchers::method;

    #[test]
    fn parse_simple_list() {
        let v = parse_ports("22,80,443").unwrap();
        assert_eq!(v, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_list() {
        let v = parse_ports("1-3,5,3").unwrap();
        assert_eq!(v, vec![1, 2, 3, 5]);
        assert_eq!(parse_ports("22,80,1000-1002").unwrap(), vec![22, 80, 1000, 1001, 1002]);
    }

    #[test]
    fn reject_invalid() {
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("10-5").is_err());
        assert!(parse_ports("http").is_err());
    }

    #[test]
    fn tls_ports_use_https() {
        assert_eq!(scheme_for(443), "https");
        assert_eq!(scheme_for(8443), "https");
        assert_eq!(scheme_for(8080), "http");
        assert_eq!(COMMON_PORTS.len(), 13);
    }

    #[tokio::test]
    async fn responding_port_is_open_refused_is_not() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        let port = server.address().port();

        let open = probe_ports(&Client::new(), "127.0.0.1", &[port, 1], Duration::from_secs(2), 4).await;
        assert_eq!(open.into_iter().collect::<Vec<_>>(), vec![port]);
    }

    /// Listener that answers every connection with `reply` and hangs up.
    async fn replying(reply: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = sock.write_all(reply).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn plain_http_on_a_tls_port_is_open() {
        let port = replying(b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n").await;
        assert!(probe_with_scheme(&Client::new(), "127.0.0.1", port, "https", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn non_http_banner_is_open() {
        let port = replying(b"SSH-2.0-OpenSSH_9.6\r\n").await;
        assert!(probe_with_scheme(&Client::new(), "127.0.0.1", port, "http", Duration::from_secs(2)).await);
        assert!(probe_with_scheme(&Client::new(), "127.0.0.1", port, "https", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn released_port_is_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!probe_with_scheme(&Client::new(), "127.0.0.1", port, "https", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn in_flight_probes_never_exceed_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut ports = Vec::new();
        for _ in 0..12 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            ports.push(listener.local_addr().unwrap().port());
            let active = active.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                while let Ok((mut sock, _)) = listener.accept().await {
                    let active = active.clone();
                    let peak = peak.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 512];
                        // The reachability check sends nothing; only count requests.
                        if matches!(sock.read(&mut buf).await, Ok(n) if n > 0) {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(150)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        }
                    });
                }
            });
        }

        let open = probe_ports(&Client::new(), "127.0.0.1", &ports, Duration::from_secs(5), 3).await;
        assert_eq!(open.len(), 12);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak}");
        assert!(peak >= 1);
    }
}
