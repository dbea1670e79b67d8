//! NAN manager daemon entry point.
//!
//! Reads newline-delimited JSON requests from a script file or stdin and
//! writes replies and notifications to stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use nanmgrd::{NanDaemon, NanmgrConfig, NanmgrError, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// NAN session and data-path manager
#[derive(Parser, Debug)]
#[command(name = "nanmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Request script (newline-delimited JSON); stdin when omitted
    #[arg(short = 's', long)]
    script: Option<PathBuf>,

    /// Tracing filter override, e.g. `debug` or `nan_core=trace`
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "nanmgrd: Daemon exiting with error");
            eprintln!("nanmgrd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = NanmgrConfig::load_or_default(&args.config)?;
    if let Some(level) = args.log_level {
        config.daemon.log_level = level;
    }
    config.validate()?;

    init_logging(&config.daemon.log_level)?;
    info!(
        max_service_id = config.limits.max_service_id,
        max_ndp_instances = config.limits.max_ndp_instances,
        max_followup_requests = config.limits.max_followup_requests,
        "nanmgrd: Starting NAN manager"
    );

    let shutdown = setup_signal_handlers();
    let daemon = NanDaemon::new(&config);
    let stdout = tokio::io::stdout();

    let stats = match args.script {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            daemon.run(file, stdout, shutdown).await?
        }
        None => daemon.run(tokio::io::stdin(), stdout, shutdown).await?,
    };

    info!(
        requests = stats.requests,
        firmware_signals = daemon.firmware().signal_count(),
        "nanmgrd: Shutdown complete"
    );
    Ok(())
}

/// Initialize structured logging on stderr. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) -> nanmgrd::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| NanmgrError::Config(format!("Failed to set logger: {}", e)))
}

/// Setup signal handlers for graceful shutdown
fn setup_signal_handlers() -> Arc<AtomicBool> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("nanmgrd: Received SIGINT");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }
    });

    shutdown_flag
}
