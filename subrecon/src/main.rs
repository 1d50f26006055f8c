use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use recon_core::{FanoutSink, JobStatus, MemorySink, ScanConfig, ScanSink};
use scan_engine::{EngineOptions, Orchestrator};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

mod config;
mod output;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

impl OutputFormat {
    fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "jsonl" => Some(OutputFormat::Jsonl),
            _ => None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "subrecon", version, about = "Subdomain attack-surface reconnaissance")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./subrecon.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More logging (-v info is the default; -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Enumerate, probe and risk-score the subdomains of a domain
    Scan {
        /// Target domain (e.g., example.com)
        domain: String,
        /// Hosts analyzed concurrently (1-200)
        #[arg(long)]
        concurrency: Option<usize>,
        /// HTTP timeout in seconds (1-60)
        #[arg(long)]
        timeout: Option<u64>,
        /// Ports to probe: comma/range list (e.g., 22,80,1000-1010). Default: common ports.
        #[arg(long)]
        ports: Option<String>,
        /// Skip port probing
        #[arg(long, default_value_t = false)]
        no_ports: bool,
        /// Skip the CORS audit
        #[arg(long, default_value_t = false)]
        no_cors: bool,
        /// Skip takeover detection
        #[arg(long, default_value_t = false)]
        no_takeover: bool,
        /// Skip cloud/SaaS prediction
        #[arg(long, default_value_t = false)]
        no_cloud: bool,
        /// Fetch /favicon.ico and record its mmh3 hash
        #[arg(long, default_value_t = false)]
        favicon: bool,
        /// Accept invalid TLS certificates
        #[arg(long, default_value_t = false)]
        insecure: bool,
        /// SQLite database to persist the scan into
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false, requires = "out")]
        csv: bool,
        /// Cancel the scan after this many seconds
        #[arg(long, value_name = "SECS")]
        max_duration: Option<u64>,
    },
    /// Run only the hostname validator over a candidate list
    Validate {
        /// Domain the candidates must belong to
        domain: String,
        /// File with newline-delimited candidates (comments with # and blanks ignored)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 | 1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let loaded_cfg = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Version => {
            println!("subrecon {} (core {})", env!("CARGO_PKG_VERSION"), recon_core::version());
        }
        Commands::Validate { domain, input, format } => {
            let domain = hostnames::normalize_domain(&domain).ok_or_else(|| anyhow!("not a valid domain: {}", domain))?;
            let fh = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let candidates: Vec<String> = BufReader::new(fh)
                .lines()
                .map_while(|l| l.ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && !s.starts_with('#'))
                .collect();
            let validated = hostnames::validate(&candidates, &domain);
            info!("{} of {} candidates in scope for {}", validated.len(), candidates.len(), domain);
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            match format {
                OutputFormat::Text => {
                    for h in &validated {
                        writeln!(w, "{}", h)?;
                    }
                }
                OutputFormat::Json => {
                    let obj = serde_json::json!({ "domain": domain, "input": candidates.len(), "validated": validated });
                    writeln!(w, "{}", serde_json::to_string_pretty(&obj)?)?;
                }
                OutputFormat::Jsonl => {
                    for h in &validated {
                        writeln!(w, "{}", serde_json::to_string(&serde_json::json!({ "hostname": h }))?)?;
                    }
                }
            }
        }
        Commands::Scan {
            domain, concurrency, timeout, ports, no_ports, no_cors, no_takeover, no_cloud, favicon, insecure, db,
            format, out, csv, max_duration,
        } => {
            let defaults = loaded_cfg.scan.clone().unwrap_or_default();
            let engine_cfg = loaded_cfg.engine.clone().unwrap_or_default();

            let mut scan_cfg = ScanConfig::for_domain(&domain);
            scan_cfg.concurrency = concurrency.or(defaults.concurrency).unwrap_or(scan_cfg.concurrency);
            scan_cfg.timeout_seconds = timeout.or(defaults.timeout_seconds).unwrap_or(scan_cfg.timeout_seconds);
            scan_cfg.enable_port_scan = !no_ports && defaults.enable_port_scan.unwrap_or(true);
            scan_cfg.enable_cors_check = !no_cors && defaults.enable_cors_check.unwrap_or(true);
            scan_cfg.enable_takeover_check = !no_takeover && defaults.enable_takeover_check.unwrap_or(true);
            scan_cfg.enable_cloud_predict = !no_cloud && defaults.enable_cloud_predict.unwrap_or(true);
            scan_cfg.fetch_favicon = favicon || defaults.fetch_favicon.unwrap_or(false);
            scan_cfg.validate()?;

            let mut engine = EngineOptions::default();
            if let Some(list) = ports.or(defaults.ports) {
                engine.ports = port_scan::parse_ports(&list)?;
            }
            if let Some(ep) = engine_cfg.ct_endpoint {
                engine.harvest.endpoint = ep;
            }
            if let Some(ep) = engine_cfg.doh_endpoint {
                engine.liveness.doh_endpoint = ep;
            }
            if let Some(ms) = engine_cfg.liveness_timeout_ms {
                engine.liveness.check_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = engine_cfg.port_timeout_ms {
                engine.port_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = engine_cfg.port_concurrency {
                engine.port_concurrency = n;
            }
            engine.accept_invalid_certs = insecure || engine_cfg.accept_invalid_certs.unwrap_or(false);
            engine.user_agent = engine_cfg.user_agent;

            let format = match format {
                Some(f) => f,
                None => match defaults.format.as_deref() {
                    Some(name) => OutputFormat::from_name(name).ok_or_else(|| anyhow!("unknown format in config: {}", name))?,
                    None => OutputFormat::Text,
                },
            };

            let memory = Arc::new(MemorySink::new());
            let mut sinks: Vec<Arc<dyn ScanSink>> = vec![memory.clone()];
            if let Some(path) = db.or(defaults.db.map(PathBuf::from)) {
                sinks.push(open_db_sink(&path)?);
            }
            let sink: Arc<dyn ScanSink> = if sinks.len() == 1 { memory.clone() } else { Arc::new(FanoutSink::new(sinks)) };

            let rt = tokio::runtime::Runtime::new()?;
            let job = rt.block_on(async move {
                let cancel = CancellationToken::new();
                if let Some(secs) = max_duration {
                    let t = cancel.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                        warn!("max duration of {}s reached, cancelling", secs);
                        t.cancel();
                    });
                }
                let t = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupted, cancelling");
                        t.cancel();
                    }
                });
                Orchestrator::new(engine, sink).run(scan_cfg, cancel).await
            });

            let records = memory.hosts();
            match out {
                Some(path) => {
                    let fh = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
                    if csv {
                        output::write_csv(fh, &records)?;
                    } else {
                        let mut w = BufWriter::new(fh);
                        write_report(&mut w, format, &job, &records)?;
                        w.flush()?;
                    }
                    info!("wrote {} host records to {}", records.len(), path.display());
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut w = stdout.lock();
                    write_report(&mut w, format, &job, &records)?;
                }
            }

            if job.status != JobStatus::Completed {
                return Err(anyhow!("scan {} {}: {}", job.id, job.status, job.error.unwrap_or_default()));
            }
        }
    }
    Ok(())
}

fn write_report<W: Write>(w: &mut W, format: OutputFormat, job: &recon_core::ScanJob, records: &[recon_core::HostRecord]) -> Result<()> {
    match format {
        OutputFormat::Text => output::write_text(w, job, records),
        OutputFormat::Json => output::write_json(w, job, records),
        OutputFormat::Jsonl => output::write_jsonl(w, job, records),
    }
}

#[cfg(feature = "results")]
fn open_db_sink(path: &std::path::Path) -> Result<Arc<dyn ScanSink>> {
    let sink = results_sqlite::SqliteSink::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "results"))]
fn open_db_sink(_path: &std::path::Path) -> Result<Arc<dyn ScanSink>> {
    Err(anyhow!("built without the `results` feature; --db is unavailable"))
}
