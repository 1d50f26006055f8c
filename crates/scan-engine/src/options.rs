use cloud_predict::PredictOptions;
use ct_harvest::HarvestOptions;
use liveness::LivenessOptions;
use port_scan::{COMMON_PORTS, DEFAULT_PORT_CONCURRENCY, DEFAULT_PROBE_TIMEOUT};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a hostname to the base URLs analyzers should request, in order.
pub type UrlMapper = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Engine-level settings that are not part of a scan request: endpoints,
/// per-stage timeouts and the port table.
#[derive(Clone)]
pub struct EngineOptions {
    pub harvest: HarvestOptions,
    pub liveness: LivenessOptions,
    pub predict: PredictOptions,
    pub ports: Vec<u16>,
    pub port_timeout: Duration,
    /// Ports probed at once per host.
    pub port_concurrency: usize,
    pub resolve_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub user_agent: Option<String>,
    pub base_urls: UrlMapper,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            harvest: HarvestOptions::default(),
            liveness: LivenessOptions::default(),
            predict: PredictOptions::default(),
            ports: COMMON_PORTS.to_vec(),
            port_timeout: DEFAULT_PROBE_TIMEOUT,
            port_concurrency: DEFAULT_PORT_CONCURRENCY,
            resolve_timeout: Duration::from_secs(3),
            accept_invalid_certs: false,
            user_agent: None,
            base_urls: Arc::new(|host: &str| recon_core::http::base_urls(host)),
        }
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("harvest", &self.harvest)
            .field("liveness", &self.liveness)
            .field("predict", &self.predict)
            .field("ports", &self.ports)
            .field("port_timeout", &self.port_timeout)
            .field("port_concurrency", &self.port_concurrency)
            .field("resolve_timeout", &self.resolve_timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}
