//! hoststatd - host load sampler daemon.
//!
//! Samples CPU, memory and disk usage on a fixed cadence and keeps a bounded
//! history in a SQLite file that reader processes can query concurrently.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use hoststat::collector::{ProcfsMetrics, RealFs};
use hoststat::config::Config;
use hoststat::logging::init_logging;
use hoststat::sampler::Sampler;
use hoststat::store::{MetricsStore, SchemaStatus};

/// Host load sampler daemon.
#[derive(Parser)]
#[command(name = "hoststatd", about = "Host load sampler daemon", version)]
struct Args {
    /// TOML configuration file. Flags below override its values.
    #[arg(short, long, env = "HOSTSTAT_CONFIG")]
    config: Option<PathBuf>,

    /// Database file.
    #[arg(long, env = "HOSTSTAT_DB")]
    db_path: Option<PathBuf>,

    /// Sampling interval in seconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Maximum number of readings kept.
    #[arg(short, long)]
    retention: Option<usize>,

    /// Mount point whose disk usage is recorded.
    #[arg(long)]
    disk_path: Option<PathBuf>,

    /// Path to /proc filesystem.
    #[arg(long)]
    proc_path: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config, hoststat::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => {
                let config = Config::from_toml_file(path)?;
                info!("Loaded config from {}", path.display());
                config
            }
            None => Config::default(),
        };

        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(interval) = self.interval {
            config.poll_interval_seconds = interval;
        }
        if let Some(retention) = self.retention {
            config.retention_count = retention;
        }
        if let Some(disk_path) = &self.disk_path {
            config.disk_path = disk_path.clone();
        }
        if let Some(proc_path) = &self.proc_path {
            config.proc_path = proc_path.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("hoststatd {} starting", env!("CARGO_PKG_VERSION"));

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Config: interval={}s, retention={}, db={}, disk={}",
        config.poll_interval_seconds,
        config.retention_count,
        config.db_path.display(),
        config.disk_path.display()
    );

    if let Some(dir) = config.db_path.parent()
        && !dir.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        error!("Failed to create {}: {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let mut store = match MetricsStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match store.ensure_schema() {
        Ok(SchemaStatus::Current) => match store.reading_count() {
            Ok(count) => info!("Storage initialized: {} readings kept", count),
            Err(e) => warn!("Failed to count readings: {}", e),
        },
        Ok(SchemaStatus::Recreated { .. }) => info!("Storage initialized: new database"),
        Err(e) => {
            error!("Failed to prepare schema: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let provider = ProcfsMetrics::new(RealFs::new(), &config.proc_path);
    let mut sampler = Sampler::new(store, provider, config.sampler_config());

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    if let Err(e) = sampler.start() {
        error!("Failed to start sampler: {}", e);
        return ExitCode::FAILURE;
    }

    let mut last_reported = 0u64;
    let mut since_report = Duration::ZERO;
    let check_interval = Duration::from_millis(100);
    let report_every = Duration::from_secs(600);
    let mut exit = ExitCode::SUCCESS;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(check_interval);
        since_report += check_interval;

        if !sampler.is_running() {
            error!("Sampler worker exited unexpectedly");
            exit = ExitCode::FAILURE;
            break;
        }

        if since_report >= report_every {
            since_report = Duration::ZERO;
            let written = sampler.stats().samples_written();
            info!(
                "Sampler: {} samples in the last {}s, {} failed ticks total",
                written - last_reported,
                report_every.as_secs(),
                sampler.stats().ticks_failed()
            );
            last_reported = written;
        }
    }

    info!("Shutting down...");
    sampler.stop();
    info!("Shutdown complete");

    exit
}
