use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{scripts, BrowserPage};
use crate::core::config::EngineConfig;
use crate::core::error::CaptureError;

/// Source of playback position samples.
#[async_trait]
pub trait ProgressProbe: Send {
    /// Current playback position in seconds, `None` when it cannot be read.
    async fn position(&mut self) -> Result<Option<f64>>;

    /// Called after a flat sample; may try to kick playback.
    async fn nudge(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reads `video.currentTime` from a page and calls `play()` when it is stuck.
pub struct PageProbe<'a> {
    page: &'a mut dyn BrowserPage,
}

impl<'a> PageProbe<'a> {
    pub fn new(page: &'a mut dyn BrowserPage) -> Self {
        Self { page }
    }
}

#[async_trait]
impl ProgressProbe for PageProbe<'_> {
    async fn position(&mut self) -> Result<Option<f64>> {
        let value = self.page.evaluate(scripts::CURRENT_TIME).await?;
        Ok(value.as_f64().filter(|v| v.is_finite()))
    }

    async fn nudge(&mut self) -> Result<()> {
        self.page.evaluate(scripts::PLAY).await?;
        Ok(())
    }
}

/// Flat-progress window, recorded once per stall declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StallEvent {
    pub unit: String,
    pub deltas: Vec<f64>,
    pub window: Duration,
}

impl StallEvent {
    pub fn into_error(self) -> CaptureError {
        CaptureError::StallTimeout { window: self.window, samples: self.deltas.len() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playback {
    Advancing { delta: f64 },
    Stalled(StallEvent),
}

/// Decides whether playback is moving.
///
/// Takes `samples` readings spread over `window`. The first forward step
/// larger than `min_progress` ends the watch as advancing; `samples`
/// consecutive readings without one end it as stalled. Reloading is left to
/// the caller.
#[derive(Debug, Clone)]
pub struct StallMonitor {
    window: Duration,
    samples: usize,
    min_progress: f64,
}

impl StallMonitor {
    pub fn new(window: Duration, samples: usize, min_progress: f64) -> Self {
        Self { window, samples: samples.max(1), min_progress }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.stall_window(), config.stall_samples, config.min_progress_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        self.window / self.samples as u32
    }

    pub async fn watch(
        &self,
        unit: &str,
        probe: &mut dyn ProgressProbe,
        cancel: &CancellationToken,
    ) -> Result<Playback, CaptureError> {
        let tick = self.poll_interval();
        let mut last = read(probe).await;
        let mut deltas = Vec::with_capacity(self.samples);

        while deltas.len() < self.samples {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
                _ = tokio::time::sleep(tick) => {}
            }

            let current = read(probe).await;
            let delta = match (last, current) {
                (Some(prev), Some(now)) => now - prev,
                _ => 0.0,
            };

            if delta > self.min_progress {
                tracing::debug!(unit, delta, "playback advancing");
                return Ok(Playback::Advancing { delta });
            }

            tracing::debug!(unit, delta, flat = deltas.len() + 1, "playback flat");
            deltas.push(delta);
            if current.is_some() {
                last = current;
            }
            if let Err(e) = probe.nudge().await {
                tracing::debug!(unit, "play nudge failed: {:#}", e);
            }
        }

        let event = StallEvent { unit: unit.to_string(), deltas, window: tick * self.samples as u32 };
        tracing::warn!(unit, window = ?event.window, "playback stalled");
        Ok(Playback::Stalled(event))
    }
}

async fn read(probe: &mut dyn ProgressProbe) -> Option<f64> {
    match probe.position().await {
        Ok(position) => position,
        Err(e) => {
            tracing::debug!("progress sample failed: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct Scripted {
        positions: VecDeque<Option<f64>>,
        nudges: usize,
    }

    impl Scripted {
        fn new(positions: &[Option<f64>]) -> Self {
            Self { positions: positions.iter().copied().collect(), nudges: 0 }
        }
    }

    #[async_trait]
    impl ProgressProbe for Scripted {
        async fn position(&mut self) -> Result<Option<f64>> {
            Ok(self.positions.pop_front().unwrap_or(Some(0.0)))
        }

        async fn nudge(&mut self) -> Result<()> {
            self.nudges += 1;
            Ok(())
        }
    }

    fn monitor() -> StallMonitor {
        StallMonitor::from_config(&EngineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn flat_window_stalls_once_after_full_window() {
        let mut probe = Scripted::new(&[Some(10.0); 7]);
        let start = Instant::now();

        let verdict = monitor().watch("h6", &mut probe, &CancellationToken::new()).await.unwrap();
        match verdict {
            Playback::Stalled(event) => {
                assert_eq!(event.deltas.len(), 6);
                assert_eq!(event.window, Duration::from_secs(30));
                assert_eq!(event.unit, "h6");
            }
            other => panic!("expected stall, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(probe.nudges, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn first_real_step_counts_as_advancing() {
        let mut probe = Scripted::new(&[Some(10.0), Some(10.0), Some(10.5)]);
        let start = Instant::now();

        let verdict = monitor().watch("h1", &mut probe, &CancellationToken::new()).await.unwrap();
        assert_eq!(verdict, Playback::Advancing { delta: 0.5 });
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_threshold_jitter_is_not_progress() {
        let mut probe = Scripted::new(&[
            Some(10.0),
            Some(10.05),
            Some(10.1),
            Some(10.12),
            Some(10.2),
            Some(10.25),
            Some(10.3),
        ]);
        let verdict = monitor().watch("h1", &mut probe, &CancellationToken::new()).await.unwrap();
        assert!(matches!(verdict, Playback::Stalled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_samples_count_as_flat() {
        let mut probe = Scripted::new(&[None, None, Some(3.0), None, Some(3.0), None, None]);
        let verdict = monitor().watch("h1", &mut probe, &CancellationToken::new()).await.unwrap();
        assert!(matches!(verdict, Playback::Stalled(ref e) if e.deltas.iter().all(|d| *d == 0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_watch() {
        let mut probe = Scripted::new(&[Some(1.0); 7]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = monitor().watch("h1", &mut probe, &cancel).await.unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled));
    }

    #[test]
    fn stall_event_maps_to_timeout() {
        let event = StallEvent { unit: "h1".into(), deltas: vec![0.0; 6], window: Duration::from_secs(30) };
        assert!(matches!(event.into_error(), CaptureError::StallTimeout { samples: 6, .. }));
    }
}
