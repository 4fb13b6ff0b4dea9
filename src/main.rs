mod browser;
mod core;
mod decoder;
mod historical;
mod output;
mod shared;
mod stream;
mod utils;
mod validator;

use anyhow::{bail, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::config::{CaptureRequest, EngineConfig};
use crate::shared::constants;

/// Harvests still frames from the Torikamera traffic stream, either live or
/// rewound by a number of hours.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Portal page or YouTube watch URL
    #[arg(long, default_value = constants::DEFAULT_SOURCE_URL)]
    url: String,
    /// Total number of frames to save
    #[arg(short, long, default_value_t = 5)]
    limit: u32,
    /// Seconds between live frames
    #[arg(short, long, default_value_t = 5)]
    interval: u64,
    #[arg(short, long, default_value = constants::DEFAULT_OUTPUT_DIR)]
    output: PathBuf,
    /// Capture from the broadcast history, this many hours back (one or more)
    #[arg(long, num_args = 1..)]
    history: Option<Vec<f64>>,
    /// Show the browser window in history mode
    #[arg(long, default_value_t = false)]
    headed: bool,
    /// History offsets captured at the same time
    #[arg(long)]
    parallel: Option<usize>,
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    crate::utils::logger::init(Path::new("."))?;
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if cli.headed {
        config.headless = false;
    }
    if let Some(parallel) = cli.parallel {
        config.parallel_offsets = parallel;
    }
    config.validate()?;

    let request = match &cli.history {
        Some(hours) => CaptureRequest::historical_hours(cli.limit, hours)?,
        None => CaptureRequest::live(cli.limit, Duration::from_secs(cli.interval))?,
    };
    tracing::info!(mode = ?request.mode(), limit = request.limit(), url = %cli.url, "starting");

    let cancel = CancellationToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, stopping");
        c.cancel();
    })?;

    let report = crate::core::runner::run(&config, &request, &cli.url, &cli.output, cancel).await?;
    report.log_summary();

    println!("Saved {} frame(s) to {}", report.total_frames(), cli.output.display());
    for unit in &report.units {
        println!("  {}", unit.summary());
    }

    if let Some(e) = report.fatal() {
        bail!("run aborted [{}]: {}", e.kind(), e);
    }
    Ok(())
}
