//! Scan orchestration: sequences the pipeline stages for one domain, owns the
//! job state machine and reports progress and results to a `ScanSink`.

pub mod analyze;
pub mod options;

pub use options::{EngineOptions, UrlMapper};

use liveness::LivenessOptions;
use recon_core::batch::run_batches;
use recon_core::http::{build_client, ClientOptions};
use recon_core::{HostRecord, JobStatus, ProgressUpdate, ReconError, ScanConfig, ScanJob, ScanSink, ScanTotals, SinkError};
use reqwest::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const PROGRESS_ENUMERATED: u8 = 15;
pub const PROGRESS_LIVENESS: u8 = 35;
pub const PROGRESS_CLOUD: u8 = 45;
pub const PROGRESS_ANALYSIS_END: u8 = 90;

pub struct Orchestrator {
    opts: Arc<EngineOptions>,
    sink: Arc<dyn ScanSink>,
}

impl Orchestrator {
    pub fn new(opts: EngineOptions, sink: Arc<dyn ScanSink>) -> Self {
        Orchestrator { opts: Arc::new(opts), sink }
    }

    /// Run one scan to a terminal state. Never returns a non-terminal job.
    pub async fn run(&self, config: ScanConfig, cancel: CancellationToken) -> ScanJob {
        let mut job = ScanJob::new(config);
        if let Err(e) = job.transition(JobStatus::Running) {
            warn!("scan {} could not start: {}", job.id, e);
            return job;
        }
        info!("scan {} started for {}", job.id, job.domain);
        self.notify("job_started", self.sink.job_started(&job));

        let outcome = self.execute(&mut job, &cancel).await;
        let settled = match outcome {
            Ok(totals) => {
                info!(
                    "scan {} completed: {} candidates, {} live, {} vulnerabilities",
                    job.id, totals.total_candidates, totals.live, totals.vulnerabilities
                );
                job.complete(totals)
            }
            Err(e) => {
                warn!("scan {} failed: {}", job.id, e);
                job.fail(e.to_string())
            }
        };
        if let Err(e) = settled {
            warn!("scan {}: {}", job.id, e);
        }
        if job.status == JobStatus::Completed {
            let update = ProgressUpdate { scan_id: job.id, progress: job.progress, status_hint: "completed".into() };
            self.notify("progress", self.sink.progress(&update));
        }
        self.notify("job_finished", self.sink.job_finished(&job));
        job
    }

    async fn execute(&self, job: &mut ScanJob, cancel: &CancellationToken) -> Result<ScanTotals, ReconError> {
        let config = job.config.clone();
        config.validate()?;
        let domain = hostnames::normalize_domain(&config.domain)
            .ok_or_else(|| ReconError::InvalidConfig(format!("not a valid domain: {}", config.domain)))?;
        let client = build_client(&ClientOptions {
            timeout: config.timeout(),
            accept_invalid_certs: self.opts.accept_invalid_certs,
            user_agent: self.opts.user_agent.clone(),
        })?;
        let mut totals = ScanTotals::default();

        let raw = guarded(cancel, ct_harvest::harvest(&client, &domain, &self.opts.harvest)).await?;
        totals.harvested = raw.len();
        let validated = hostnames::validate(&raw, &domain);
        totals.total_candidates = validated.len();
        self.advance(job, PROGRESS_ENUMERATED, "enumerated");

        let live_opts = LivenessOptions { concurrency: config.concurrency, ..self.opts.liveness.clone() };
        let live = guarded(cancel, liveness::probe_live(&client, &validated, &live_opts)).await?;
        totals.live = live.len();
        info!("{}: {} of {} candidates live", domain, live.len(), validated.len());
        self.advance(job, PROGRESS_LIVENESS, "liveness");

        let cloud = if config.enable_cloud_predict {
            let mut predict_opts = self.opts.predict.clone();
            predict_opts.concurrency = config.concurrency;
            guarded(cancel, cloud_predict::predict(&client, &live, &predict_opts)).await?
        } else {
            BTreeMap::new()
        };
        self.advance(job, PROGRESS_CLOUD, "cloud prediction");

        let records = guarded(cancel, self.deep_analysis(job, &client, &live, cloud)).await?;
        totals.tally(&records);
        Ok(totals)
    }

    async fn deep_analysis(
        &self,
        job: &mut ScanJob,
        client: &Client,
        live: &BTreeSet<String>,
        mut cloud: BTreeMap<String, Vec<String>>,
    ) -> Vec<HostRecord> {
        let config = Arc::new(job.config.clone());
        let scan_id = job.id;
        let items: Vec<(String, Vec<String>)> =
            live.iter().map(|h| (h.clone(), cloud.remove(h).unwrap_or_default())).collect();

        run_batches(
            items,
            config.concurrency,
            |(host, findings)| {
                let client = client.clone();
                let config = config.clone();
                let opts = self.opts.clone();
                async move { analyze::analyze_host(&client, &host, &config, &opts, findings).await }
            },
            |p, batch| {
                if !batch.is_empty() {
                    self.notify("persist_hosts", self.sink.persist_hosts(scan_id, batch));
                }
                self.advance(job, p.scaled(PROGRESS_CLOUD, PROGRESS_ANALYSIS_END), "analyzing");
            },
        )
        .await
    }

    fn advance(&self, job: &mut ScanJob, progress: u8, hint: &str) {
        if job.advance(progress) {
            let update = ProgressUpdate { scan_id: job.id, progress: job.progress, status_hint: hint.to_string() };
            self.notify("progress", self.sink.progress(&update));
        }
    }

    fn notify(&self, call: &str, result: Result<(), SinkError>) {
        if let Err(e) = result {
            warn!("sink {} failed: {}", call, e);
        }
    }
}

async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, ReconError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconError::Cancelled),
        out = fut => Ok(out),
    }
}
