use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use memsnap::snapshot_modules::config::{PartialSnapshotConfig, SnapshotConfig};
use memsnap::snapshot_modules::runner::run_once;
use memsnap::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Writes a point-in-time memory usage snapshot", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot destination (default: ~/memory_usage.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Kernel memory table to read
    #[arg(long)]
    meminfo: Option<PathBuf>,

    /// Docker-compatible CLI used for container stats
    #[arg(long)]
    runtime: Option<String>,

    /// Skip container collection
    #[arg(long)]
    no_containers: bool,

    /// Fail instead of writing a partial snapshot when host memory is incomplete
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn overrides(&self) -> PartialSnapshotConfig {
        PartialSnapshotConfig {
            output_path: self.output.clone(),
            meminfo_path: self.meminfo.clone(),
            container_runtime: self.runtime.clone(),
            collect_containers: self.no_containers.then_some(false),
            require_host_memory: self.strict.then_some(true),
            ..Default::default()
        }
    }
}

fn init_logging(log_dir: Option<&Path>) {
    // stdout is left alone; human-readable lines go to stderr.
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let mut file_error = None;
    let file_layer = match log_dir {
        Some(dir) => match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix("memsnap")
            .filename_suffix("log")
            .build(dir)
        {
            Ok(appender) => Some(fmt::layer().with_writer(appender).with_ansi(false).json()),
            Err(e) => {
                file_error = Some(e);
                None
            }
        },
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!(log_dir = ?log_dir, error = %e, "Failed to open log file, logging to stderr only.");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match SnapshotConfig::load(args.config.as_deref(), args.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("memsnap: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    init_logging(config.log_dir.as_deref());
    info!(
        version = VERSION,
        config_file = ?args.config,
        output = ?config.output_path,
        "Starting memory snapshot."
    );

    match run_once(&config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Snapshot run failed.");
            ExitCode::from(e.exit_code())
        }
    }
}
