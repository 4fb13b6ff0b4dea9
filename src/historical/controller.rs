use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::browser::{
    scripts, BrowserLauncher, BrowserPage, ConsentHandler, DomOverrideInjector, PageProbe, Playback,
    StallMonitor,
};
use crate::core::budget::FrameBudget;
use crate::core::config::EngineConfig;
use crate::core::error::CaptureError;
use crate::core::frame::Frame;
use crate::core::session::{CaptureSession, SessionState};
use crate::output::OutputWriter;
use crate::shared::constants;
use crate::utils::time_utils::{self, Backoff};
use crate::validator::FrameValidator;

const VIDEO_POLL: Duration = Duration::from_millis(250);

type PageSlot = Option<Box<dyn BrowserPage>>;

/// Drives one browser session per history offset.
///
/// The controller itself is stateless between offsets and can be shared by
/// several offsets running at once; each call gets its own page and session.
pub struct HistoricalController {
    launcher: Arc<dyn BrowserLauncher>,
    writer: Arc<OutputWriter>,
    budget: Arc<FrameBudget>,
    validator: FrameValidator,
    consent: ConsentHandler,
    overrides: DomOverrideInjector,
    stall: StallMonitor,
    backoff: Backoff,
    watch_url: String,
    max_attempts: u32,
    navigation_timeout: Duration,
    session_deadline: Duration,
    reload_nudge: Duration,
    frame_step: Duration,
    cancel: CancellationToken,
}

impl HistoricalController {
    pub fn new(
        config: &EngineConfig,
        launcher: Arc<dyn BrowserLauncher>,
        writer: Arc<OutputWriter>,
        budget: Arc<FrameBudget>,
        watch_url: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            writer,
            budget,
            validator: FrameValidator::from_config(config),
            consent: ConsentHandler::from_config(config),
            overrides: DomOverrideInjector::new(),
            stall: StallMonitor::from_config(config),
            backoff: Backoff::from_millis(config.backoff_base_ms, config.backoff_max_ms),
            watch_url: watch_url.into(),
            max_attempts: config.max_attempts,
            navigation_timeout: config.navigation_timeout(),
            session_deadline: config.session_deadline(),
            reload_nudge: config.reload_seek_nudge(),
            frame_step: config.frame_step(),
            cancel,
        }
    }

    pub fn unit_label(offset: Duration) -> String {
        format!("h{}", time_utils::format_hours(offset))
    }

    pub fn new_session(&self, offset: Duration, share: u32) -> CaptureSession {
        CaptureSession::new(Self::unit_label(offset), share, self.max_attempts)
    }

    /// Captures up to `share` frames `offset` behind the live edge.
    #[cfg(test)]
    pub async fn run_offset(&self, offset: Duration, share: u32) -> Result<u32, CaptureError> {
        let mut session = self.new_session(offset, share);
        self.run_session(&mut session, offset).await
    }

    /// Runs `session` to completion. The session stays with the caller so the
    /// frames saved before a failure stay visible.
    pub async fn run_session(
        &self,
        session: &mut CaptureSession,
        offset: Duration,
    ) -> Result<u32, CaptureError> {
        tracing::info!(unit = session.label(), share = session.share(), "starting historical session");
        let mut slot: PageSlot = None;

        let result = tokio::select! {
            r = self.drive(session, &mut slot, offset) => r,
            _ = tokio::time::sleep(self.session_deadline) => {
                Err(CaptureError::DeadlineExceeded(self.session_deadline))
            }
            _ = self.cancel.cancelled() => Err(CaptureError::Cancelled),
        };

        release(&mut slot).await;
        if result.is_err() && !session.state().is_terminal() {
            session.transition(SessionState::Failed);
        }
        match &result {
            Ok(frames) => tracing::info!(
                unit = session.label(),
                frames,
                attempts = session.attempt_count(),
                elapsed = ?session.started_at().elapsed(),
                "session completed"
            ),
            Err(e) => tracing::warn!(unit = session.label(), kind = e.kind(), "session failed: {}", e),
        }
        result
    }

    async fn navigate(&self, page: &mut dyn BrowserPage, by: Instant) -> Result<(), CaptureError> {
        match tokio::time::timeout_at(by, page.navigate(&self.watch_url)).await {
            Ok(result) => result.map_err(|e| CaptureError::Navigation(format!("{:#}", e))),
            Err(_) => Err(CaptureError::Navigation(format!(
                "page did not load within {:?}",
                self.navigation_timeout
            ))),
        }
    }

    /// Waits for the player to report metadata and returns its position,
    /// which right after load is the live edge.
    async fn live_edge(&self, page: &mut dyn BrowserPage, by: Instant) -> Result<f64, CaptureError> {
        let wait = async {
            loop {
                match page.evaluate(scripts::LIVE_EDGE).await {
                    Ok(value) => {
                        if let Some(position) = value.as_f64() {
                            return position;
                        }
                    }
                    Err(e) => tracing::debug!("player read failed: {:#}", e),
                }
                tokio::time::sleep(VIDEO_POLL).await;
            }
        };

        tokio::time::timeout_at(by, wait).await.map_err(|_| {
            CaptureError::Navigation(format!("player metadata not loaded within {:?}", self.navigation_timeout))
        })
    }

    async fn reload(
        &self,
        session: &mut CaptureSession,
        slot: &mut PageSlot,
        cause: CaptureError,
    ) -> Result<(), CaptureError> {
        let attempt = session.record_failure(cause)?;
        session.transition(SessionState::Reloading);
        release(slot).await;
        self.backoff.wait(attempt).await;
        Ok(())
    }

    async fn drive(
        &self,
        session: &mut CaptureSession,
        slot: &mut PageSlot,
        offset: Duration,
    ) -> Result<u32, CaptureError> {
        let mut reloads: u32 = 0;

        'navigate: loop {
            if session.state() == SessionState::Reloading {
                reloads += 1;
                session.transition(SessionState::Navigating);
            }

            let page = self
                .launcher
                .open_page()
                .await
                .map_err(|e| CaptureError::BrowserUnavailable(format!("{:#}", e)))?;
            let page = slot.insert(page).as_mut();

            // the consent wall can hide the player, so it goes before the video wait
            let load_by = Instant::now() + self.navigation_timeout;
            if let Err(e) = self.navigate(page, load_by).await {
                self.reload(session, slot, e).await?;
                continue 'navigate;
            }

            session.transition(SessionState::AwaitingConsent);
            match self.consent.dismiss(page).await {
                Ok(outcome) => tracing::debug!(unit = session.label(), ?outcome, "consent"),
                Err(e) => tracing::warn!(unit = session.label(), kind = e.kind(), "{}", e),
            }
            let live_edge = match self.live_edge(page, load_by).await {
                Ok(position) => position,
                Err(e) => {
                    self.reload(session, slot, e).await?;
                    continue 'navigate;
                }
            };

            session.transition(SessionState::InjectingOverrides);
            if let Err(e) = self.overrides.apply(page).await {
                self.reload(session, slot, e).await?;
                continue 'navigate;
            }

            session.transition(SessionState::Buffering);
            let target = (live_edge - offset.as_secs_f64()).max(0.0)
                + self.reload_nudge.as_secs_f64() * f64::from(reloads);
            tracing::debug!(unit = session.label(), live_edge, target, "seeking");
            best_effort(page, &scripts::seek(target)).await;
            best_effort(page, scripts::PLAY).await;

            loop {
                let playback = {
                    let mut probe = PageProbe::new(page);
                    self.stall.watch(session.label(), &mut probe, &self.cancel).await?
                };
                if let Playback::Stalled(event) = playback {
                    session.transition(SessionState::StallDetected);
                    tracing::warn!(unit = %event.unit, deltas = ?event.deltas, "reloading stalled page");
                    self.reload(session, slot, event.into_error()).await?;
                    continue 'navigate;
                }

                session.transition(SessionState::Capturing);
                let bytes = match page.screenshot_element(constants::VIDEO_SELECTOR).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let cause = CaptureError::Navigation(format!("screenshot failed: {:#}", e));
                        self.reload(session, slot, cause).await?;
                        continue 'navigate;
                    }
                };

                if let Err(e) = self.validator.check(&bytes).into_result() {
                    session.record_failure(e)?;
                    session.transition(SessionState::Buffering);
                    continue;
                }

                if !self.budget.try_claim() {
                    tracing::info!(unit = session.label(), "frame budget exhausted");
                    session.transition(SessionState::Completed);
                    return Ok(session.captured_count());
                }
                let frame = Frame::historical(bytes, offset, session.captured_count());
                if let Err(e) = self.writer.write(frame) {
                    self.budget.release();
                    return Err(e);
                }
                session.record_capture();

                if !session.wants_more() {
                    session.transition(SessionState::Completed);
                    return Ok(session.captured_count());
                }
                best_effort(page, &scripts::step(self.frame_step.as_secs_f64())).await;
                session.transition(SessionState::Buffering);
            }
        }
    }
}

async fn best_effort(page: &mut dyn BrowserPage, script: &str) {
    if let Err(e) = page.evaluate(script).await {
        tracing::debug!("player script failed: {:#}", e);
    }
}

async fn release(slot: &mut PageSlot) {
    if let Some(mut page) = slot.take() {
        if let Err(e) = page.close().await {
            tracing::debug!("failed to close page: {:#}", e);
        }
    }
}
