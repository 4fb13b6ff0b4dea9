use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::core::budget::FrameBudget;
use crate::core::config::{CaptureRequest, EngineConfig, RequestKind};
use crate::core::error::CaptureError;
use crate::decoder::OpenCvOpener;
use crate::historical::HistoricalController;
use crate::output::OutputWriter;
use crate::stream::acquirer::LIVE_UNIT;
use crate::stream::{StreamModeAcquirer, StreamResolver, YtDlpResolver};
use crate::utils::time_utils::Backoff;
use crate::validator::FrameValidator;

#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Completed { frames: u32 },
    Skipped { reason: String },
    /// `frames` counts what the unit saved before it failed.
    Failed { kind: &'static str, frames: u32, message: String },
}

/// Outcome of one requested unit: the live run or one history offset.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub unit: String,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    fn completed(unit: &str, frames: u32) -> Self {
        Self { unit: unit.to_string(), outcome: UnitOutcome::Completed { frames } }
    }

    fn skipped(unit: &str, reason: impl Into<String>) -> Self {
        Self { unit: unit.to_string(), outcome: UnitOutcome::Skipped { reason: reason.into() } }
    }

    fn failed(unit: &str, frames: u32, error: &CaptureError) -> Self {
        Self {
            unit: unit.to_string(),
            outcome: UnitOutcome::Failed { kind: error.kind(), frames, message: error.to_string() },
        }
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            UnitOutcome::Completed { frames } => format!("{}: completed, {} frame(s)", self.unit, frames),
            UnitOutcome::Skipped { reason } => format!("{}: skipped ({})", self.unit, reason),
            UnitOutcome::Failed { kind, frames, message } => {
                format!("{}: failed [{}] after {} frame(s): {}", self.unit, kind, frames, message)
            }
        }
    }
}

/// Per-unit outcomes of a run, in request order, plus the error that aborted
/// the run if there was one.
#[derive(Debug)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
    fatal: Option<CaptureError>,
}

impl RunReport {
    /// Every unit failed before any work started.
    fn aborted(units: &[String], error: CaptureError) -> Self {
        let units = units.iter().map(|u| UnitReport::failed(u, 0, &error)).collect();
        Self { units, fatal: Some(error) }
    }

    pub fn total_frames(&self) -> u32 {
        self.units
            .iter()
            .map(|u| match u.outcome {
                UnitOutcome::Completed { frames } | UnitOutcome::Failed { frames, .. } => frames,
                UnitOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn fatal(&self) -> Option<&CaptureError> {
        self.fatal.as_ref()
    }

    pub fn log_summary(&self) {
        for unit in &self.units {
            match unit.outcome {
                UnitOutcome::Completed { .. } => tracing::info!("{}", unit.summary()),
                _ => tracing::warn!("{}", unit.summary()),
            }
        }
        tracing::info!(frames = self.total_frames(), units = self.units.len(), "run finished");
    }
}

fn unit_labels(request: &CaptureRequest) -> Vec<String> {
    match request.kind() {
        RequestKind::Live { .. } => vec![LIVE_UNIT.to_string()],
        RequestKind::Historical { offsets } => {
            offsets.iter().map(|o| HistoricalController::unit_label(*o)).collect()
        }
    }
}

/// Runs the live acquirer to completion. Any terminal error aborts the run.
pub async fn run_live(
    acquirer: &StreamModeAcquirer,
    limit: u32,
    interval: Duration,
    deadline: Duration,
) -> RunReport {
    match acquirer.run(limit, interval, deadline).await {
        Ok(frames) => RunReport { units: vec![UnitReport::completed(LIVE_UNIT, frames)], fatal: None },
        Err(e) => {
            let report = UnitReport::failed(LIVE_UNIT, acquirer.budget.claimed(), &e);
            RunReport { units: vec![report], fatal: Some(e) }
        }
    }
}

/// Runs the offsets in order, or up to `parallel` at once. A failed offset
/// does not stop the others; a fatal error does.
pub async fn run_historical(
    controller: Arc<HistoricalController>,
    offsets: &[Duration],
    shares: &[u32],
    budget: Arc<FrameBudget>,
    parallel: usize,
    cancel: CancellationToken,
) -> RunReport {
    if parallel <= 1 {
        run_sequential(&controller, offsets, shares, &budget).await
    } else {
        run_parallel(controller, offsets, shares, budget, parallel, cancel).await
    }
}

/// Runs one offset; the error is handed back only when it is fatal.
async fn capture_offset(
    controller: &HistoricalController,
    offset: Duration,
    share: u32,
) -> (UnitReport, Option<CaptureError>) {
    let mut session = controller.new_session(offset, share);
    match controller.run_session(&mut session, offset).await {
        Ok(frames) => (UnitReport::completed(session.label(), frames), None),
        Err(e) => {
            let report = UnitReport::failed(session.label(), session.captured_count(), &e);
            (report, e.is_fatal().then_some(e))
        }
    }
}

async fn run_sequential(
    controller: &HistoricalController,
    offsets: &[Duration],
    shares: &[u32],
    budget: &FrameBudget,
) -> RunReport {
    let mut units = Vec::with_capacity(offsets.len());
    let mut fatal: Option<CaptureError> = None;

    for (offset, share) in offsets.iter().zip(shares) {
        let unit = HistoricalController::unit_label(*offset);
        if let Some(e) = &fatal {
            units.push(UnitReport::skipped(&unit, format!("run aborted by {}", e.kind())));
            continue;
        }
        if budget.is_exhausted() {
            units.push(UnitReport::skipped(&unit, "frame budget exhausted"));
            continue;
        }

        let (report, error) = capture_offset(controller, *offset, *share).await;
        units.push(report);
        if let Some(e) = error {
            tracing::error!(unit = %unit, "aborting run: {}", e);
            fatal = Some(e);
        }
    }

    RunReport { units, fatal }
}

async fn run_parallel(
    controller: Arc<HistoricalController>,
    offsets: &[Duration],
    shares: &[u32],
    budget: Arc<FrameBudget>,
    parallel: usize,
    cancel: CancellationToken,
) -> RunReport {
    let permits = Arc::new(Semaphore::new(parallel));
    let mut tasks = JoinSet::new();

    for (index, (offset, share)) in offsets.iter().copied().zip(shares.iter().copied()).enumerate() {
        let controller = Arc::clone(&controller);
        let budget = Arc::clone(&budget);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let unit = HistoricalController::unit_label(offset);
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, UnitReport::skipped(&unit, "worker pool closed"), None),
            };
            if cancel.is_cancelled() {
                return (index, UnitReport::skipped(&unit, "run aborted"), None);
            }
            if budget.is_exhausted() {
                return (index, UnitReport::skipped(&unit, "frame budget exhausted"), None);
            }
            let (report, error) = capture_offset(&controller, offset, share).await;
            if error.is_some() {
                cancel.cancel();
            }
            (index, report, error)
        });
    }

    let mut slots: Vec<Option<UnitReport>> = vec![None; offsets.len()];
    let mut fatal: Option<CaptureError> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report, error)) => {
                slots[index] = Some(report);
                // the first fatal error wins; later ones are usually its Cancelled echo
                if fatal.is_none() {
                    fatal = error;
                }
            }
            Err(e) => tracing::error!("offset task panicked: {}", e),
        }
    }

    let units = slots
        .into_iter()
        .zip(offsets)
        .map(|(slot, offset)| {
            slot.unwrap_or_else(|| UnitReport {
                unit: HistoricalController::unit_label(*offset),
                outcome: UnitOutcome::Failed { kind: "Panic", frames: 0, message: "offset task panicked".into() },
            })
        })
        .collect();
    RunReport { units, fatal }
}

/// Wires the production collaborators for `request` and runs it.
pub async fn run(
    config: &EngineConfig,
    request: &CaptureRequest,
    source_url: &str,
    output: &Path,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let labels = unit_labels(request);
    let writer = match OutputWriter::new(output) {
        Ok(writer) => Arc::new(writer),
        Err(e) => return Ok(RunReport::aborted(&labels, e)),
    };
    let budget = Arc::new(FrameBudget::new(request.limit()));
    tracing::info!(dir = %writer.dir().display(), limit = budget.limit(), "output ready");
    let resolver = Arc::new(YtDlpResolver::new()?);

    match request.kind() {
        RequestKind::Live { interval } => {
            let acquirer = StreamModeAcquirer {
                resolver,
                opener: Arc::new(OpenCvOpener::new(config.live_frame_wait())),
                writer,
                budget,
                validator: FrameValidator::from_config(config),
                backoff: Backoff::from_millis(config.backoff_base_ms, config.backoff_max_ms),
                max_attempts: config.live_max_attempts,
                source_url: source_url.to_string(),
                cancel,
            };
            let deadline = config.live_deadline(request.limit(), *interval);
            Ok(run_live(&acquirer, request.limit(), *interval, deadline).await)
        }
        RequestKind::Historical { offsets } => {
            let watch_url = match resolver.watch_url(source_url).await {
                Ok(url) => url,
                Err(e) => {
                    let error = CaptureError::InvalidRequest(format!("{:#}", e));
                    return Ok(RunReport::aborted(&labels, error));
                }
            };

            let launcher = match ChromiumLauncher::launch(config.headless).await {
                Ok(launcher) => Arc::new(launcher),
                Err(e) => {
                    let error = CaptureError::BrowserUnavailable(format!("{:#}", e));
                    return Ok(RunReport::aborted(&labels, error));
                }
            };

            let run_cancel = cancel.child_token();
            let controller = Arc::new(HistoricalController::new(
                config,
                Arc::clone(&launcher) as Arc<dyn BrowserLauncher>,
                writer,
                Arc::clone(&budget),
                watch_url,
                run_cancel.clone(),
            ));

            let shares = request.offset_shares();
            let report =
                run_historical(controller, offsets, &shares, budget, config.parallel_offsets, run_cancel).await;

            match Arc::try_unwrap(launcher) {
                Ok(launcher) => {
                    if let Err(e) = launcher.shutdown().await {
                        tracing::warn!("{:#}", e);
                    }
                }
                Err(_) => tracing::warn!("browser still in use, leaving it to exit with the process"),
            }
            Ok(report)
        }
    }
}
