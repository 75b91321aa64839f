//! hoststat - prints the host load history recorded by hoststatd.
//!
//! Opens the shared database (taking the same file lock as the daemon) and
//! writes the latest readings to stdout as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, warn};

use hoststat::collector::{ProcfsMetrics, RealFs};
use hoststat::config::Config;
use hoststat::logging::init_logging;
use hoststat::report;
use hoststat::store::{MetricsStore, Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Series {
    /// CPU percent.
    Cpu,
    /// Memory used/total bytes.
    Memory,
    /// Disk used/total bytes.
    Disk,
    /// All three series.
    All,
    /// Stored rows as-is.
    Raw,
}

/// Host load history viewer.
#[derive(Parser)]
#[command(name = "hoststat", about = "Print recorded host load history", version)]
struct Args {
    /// Series to print.
    #[arg(value_enum, default_value = "all")]
    series: Series,

    /// TOML configuration file (same format as hoststatd).
    #[arg(short, long, env = "HOSTSTAT_CONFIG")]
    config: Option<PathBuf>,

    /// Database file.
    #[arg(long, env = "HOSTSTAT_DB")]
    db_path: Option<PathBuf>,

    /// Number of latest readings to print.
    #[arg(short = 'n', long, default_value = "300")]
    count: usize,

    /// Compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, false);

    let mut config = match &args.config {
        Some(path) => match Config::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.clone();
    }

    let readings = match read_latest(&config, args.count) {
        Ok(readings) => readings,
        Err(e) => {
            error!("Failed to read {}: {}", config.db_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let value = match render(args.series, &readings, || host_totals(&config)) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to encode output: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let output = if args.compact {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    };

    match output {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to encode output: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Latest `count` readings; an absent database has none.
fn read_latest(
    config: &Config,
    count: usize,
) -> Result<Vec<Reading>, hoststat::store::StoreError> {
    if !config.db_path.exists() {
        warn!("{} does not exist yet", config.db_path.display());
        return Ok(Vec::new());
    }
    let mut store = MetricsStore::open(&config.db_path)?;
    store.get_latest_readings(count)
}

/// Memory and disk sizes of this host, 0 where unavailable.
fn host_totals(config: &Config) -> (u64, u64) {
    let metrics = ProcfsMetrics::new(RealFs::new(), &config.proc_path);
    let memory = metrics.memory_total_bytes().unwrap_or_else(|e| {
        warn!("Memory total unavailable: {}", e);
        0
    });
    let disk = metrics.disk_total_bytes(&config.disk_path).unwrap_or_else(|e| {
        warn!("Disk total unavailable: {}", e);
        0
    });
    (memory, disk)
}

/// Shapes `readings` as the requested series. `totals` is only called for
/// series that need memory or disk sizes.
fn render(
    series: Series,
    readings: &[Reading],
    totals: impl FnOnce() -> (u64, u64),
) -> Result<serde_json::Value, serde_json::Error> {
    match series {
        Series::Cpu => serde_json::to_value(report::cpu_history(readings)),
        Series::Memory => {
            let (memory, _) = totals();
            serde_json::to_value(report::memory_history(readings, memory))
        }
        Series::Disk => {
            let (_, disk) = totals();
            serde_json::to_value(report::disk_history(readings, disk))
        }
        Series::All => {
            let (memory, disk) = totals();
            serde_json::to_value(report::status_history(readings, memory, disk))
        }
        Series::Raw => serde_json::to_value(readings),
    }
}
