use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "subrecon.yaml";

/// Defaults for `subrecon scan`; command-line flags win over these.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanDefaults {
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub ports: Option<String>,
    pub enable_port_scan: Option<bool>,
    pub enable_cors_check: Option<bool>,
    pub enable_takeover_check: Option<bool>,
    pub enable_cloud_predict: Option<bool>,
    pub fetch_favicon: Option<bool>,
    pub format: Option<String>,
    pub db: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct EngineConfig {
    pub ct_endpoint: Option<String>,
    pub doh_endpoint: Option<String>,
    pub accept_invalid_certs: Option<bool>,
    pub user_agent: Option<String>,
    pub liveness_timeout_ms: Option<u64>,
    pub port_timeout_ms: Option<u64>,
    pub port_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanDefaults>,
    pub engine: Option<EngineConfig>,
}

/// Load `path`, or `./subrecon.yaml` when no path is given and it exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_parses() {
        let cfg: Config = serde_yaml::from_str(
            "scan:\n  concurrency: 50\n  ports: \"22,80,8000-8010\"\nengine:\n  doh_endpoint: https://cloudflare-dns.com\n",
        )
        .unwrap();
        let scan = cfg.scan.unwrap();
        assert_eq!(scan.concurrency, Some(50));
        assert_eq!(scan.enable_cors_check, None);
        assert_eq!(cfg.engine.unwrap().doh_endpoint.as_deref(), Some("https://cloudflare-dns.com"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/subrecon.yaml"))).is_err());
    }
}
