use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{LiveFrameSource, LiveSourceOpener, StreamResolver};
use crate::core::budget::FrameBudget;
use crate::core::error::CaptureError;
use crate::core::frame::Frame;
use crate::core::session::{CaptureSession, SessionState};
use crate::output::OutputWriter;
use crate::utils::time_utils::Backoff;
use crate::validator::FrameValidator;

pub const LIVE_UNIT: &str = "live";

/// Samples the live broadcast on a fixed timer.
pub struct StreamModeAcquirer {
    pub resolver: Arc<dyn StreamResolver>,
    pub opener: Arc<dyn LiveSourceOpener>,
    pub writer: Arc<OutputWriter>,
    pub budget: Arc<FrameBudget>,
    pub validator: FrameValidator,
    pub backoff: Backoff,
    pub max_attempts: u32,
    pub source_url: String,
    pub cancel: CancellationToken,
}

impl StreamModeAcquirer {
    /// Captures `limit` frames, one per `interval`. Every error returned here
    /// ends the live run.
    pub async fn run(&self, limit: u32, interval: Duration, deadline: Duration) -> Result<u32, CaptureError> {
        let mut session = CaptureSession::new(LIVE_UNIT, limit, self.max_attempts);
        tracing::info!(limit, ?interval, ?deadline, "starting live capture");

        let result = tokio::select! {
            r = self.drive(&mut session, interval) => r,
            _ = tokio::time::sleep(deadline) => Err(CaptureError::DeadlineExceeded(deadline)),
            _ = self.cancel.cancelled() => Err(CaptureError::Cancelled),
        };

        if result.is_err() && !session.state().is_terminal() {
            session.transition(SessionState::Failed);
        }
        result
    }

    async fn open_source(&self) -> Result<Box<dyn LiveFrameSource>, CaptureError> {
        let watch = self
            .resolver
            .watch_url(&self.source_url)
            .await
            .map_err(|e| CaptureError::StreamResolution(format!("{:#}", e)))?;
        let media = self
            .resolver
            .media_url(&watch)
            .await
            .map_err(|e| CaptureError::StreamResolution(format!("{:#}", e)))?;
        self.opener
            .open(&media)
            .await
            .map_err(|e| CaptureError::StreamResolution(format!("open failed: {:#}", e)))
    }

    async fn retry(&self, session: &mut CaptureSession, cause: CaptureError) -> Result<(), CaptureError> {
        let attempt = session.record_failure(cause)?;
        session.transition(SessionState::Reloading);
        self.backoff.wait(attempt).await;
        session.transition(SessionState::Navigating);
        Ok(())
    }

    async fn drive(&self, session: &mut CaptureSession, interval: Duration) -> Result<u32, CaptureError> {
        let mut sequence: u64 = 0;

        'resolve: loop {
            let mut source = match self.open_source().await {
                Ok(source) => source,
                Err(e) => {
                    self.retry(session, e).await?;
                    continue 'resolve;
                }
            };
            session.transition(SessionState::Buffering);

            // first tick completes immediately
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                session.transition(SessionState::Capturing);

                let bytes = match source.next_frame().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        drop(source);
                        self.retry(session, CaptureError::StreamResolution(format!("decode failed: {:#}", e)))
                            .await?;
                        continue 'resolve;
                    }
                };

                if let Err(e) = self.validator.check(&bytes).into_result() {
                    session.record_failure(e)?;
                    continue;
                }

                if !self.budget.try_claim() {
                    session.transition(SessionState::Completed);
                    return Ok(session.captured_count());
                }
                if let Err(e) = self.writer.write(Frame::live(bytes, sequence)) {
                    self.budget.release();
                    return Err(e);
                }
                sequence += 1;
                session.record_capture();

                if !session.wants_more() {
                    session.transition(SessionState::Completed);
                    tracing::info!(frames = session.captured_count(), "live capture complete");
                    return Ok(session.captured_count());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::utils::file_utils;
    use crate::validator::fixtures::{black_png, noise_png};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Resolver {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl StreamResolver for Resolver {
        async fn watch_url(&self, source_url: &str) -> Result<String> {
            Ok(source_url.to_string())
        }

        async fn media_url(&self, _watch_url: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures.load(Ordering::SeqCst) {
                return Err(anyhow!("yt-dlp: video unavailable"));
            }
            Ok("https://media.test/live.m3u8".into())
        }
    }

    /// Hands out frames from a script and records when each was pulled.
    struct Source {
        frames: Arc<Mutex<VecDeque<Result<Vec<u8>>>>>,
        pulls: Arc<Mutex<Vec<Instant>>>,
        seed: u32,
    }

    #[async_trait]
    impl LiveFrameSource for Source {
        async fn next_frame(&mut self) -> Result<Vec<u8>> {
            self.pulls.lock().unwrap().push(Instant::now());
            self.seed += 1;
            self.frames
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(noise_png(160, 90, self.seed)))
        }
    }

    #[derive(Default)]
    struct Opener {
        frames: Arc<Mutex<VecDeque<Result<Vec<u8>>>>>,
        pulls: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl LiveSourceOpener for Opener {
        async fn open(&self, _media_url: &str) -> Result<Box<dyn LiveFrameSource>> {
            Ok(Box::new(Source { frames: Arc::clone(&self.frames), pulls: Arc::clone(&self.pulls), seed: 0 }))
        }
    }

    fn acquirer(dir: &std::path::Path, resolver: Resolver, opener: Opener, limit: u32) -> StreamModeAcquirer {
        let config = EngineConfig::default();
        StreamModeAcquirer {
            resolver: Arc::new(resolver),
            opener: Arc::new(opener),
            writer: Arc::new(OutputWriter::new(dir).unwrap()),
            budget: Arc::new(FrameBudget::new(limit)),
            validator: FrameValidator::new(64, config.min_variance, config.variance_stride),
            backoff: Backoff::from_millis(config.backoff_base_ms, config.backoff_max_ms),
            max_attempts: config.live_max_attempts,
            source_url: "https://www.youtube.com/watch?v=F7SDNtc5waU".into(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn captures_limit_frames_one_interval_apart() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Opener::default();
        let pulls = Arc::clone(&opener.pulls);
        let acq = acquirer(dir.path(), Resolver::default(), opener, 5);

        let interval = Duration::from_secs(5);
        let frames = acq.run(5, interval, Duration::from_secs(600)).await.unwrap();
        assert_eq!(frames, 5);

        let files = file_utils::list_files(dir.path(), &["png", "jpg"]).unwrap();
        assert_eq!(files.len(), 5);
        for (i, file) in files.iter().enumerate() {
            let name = file.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.contains(&format!("live_s{:05}", i)), "{}", name);
        }

        let pulls = pulls.lock().unwrap();
        assert_eq!(pulls.len(), 5);
        for pair in pulls.windows(2) {
            assert_eq!(pair[1] - pair[0], interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn degenerate_frame_waits_for_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Opener::default();
        opener.frames.lock().unwrap().push_back(Ok(black_png(160, 90)));
        let pulls = Arc::clone(&opener.pulls);
        let acq = acquirer(dir.path(), Resolver::default(), opener, 2);

        let frames = acq.run(2, Duration::from_secs(5), Duration::from_secs(600)).await.unwrap();
        assert_eq!(frames, 2);
        assert_eq!(pulls.lock().unwrap().len(), 3);

        let files = file_utils::list_files(dir.path(), &["png", "jpg"]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names[0].contains("live_s00000") && names[1].contains("live_s00001"), "{:?}", names);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_resolution_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::default();
        resolver.failures.store(2, Ordering::SeqCst);
        let acq = acquirer(dir.path(), resolver, Opener::default(), 1);

        assert_eq!(acq.run(1, Duration::from_secs(5), Duration::from_secs(600)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_resolution_failure_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::default();
        resolver.failures.store(u32::MAX, Ordering::SeqCst);
        let acq = acquirer(dir.path(), resolver, Opener::default(), 5);

        let err = acq.run(5, Duration::from_secs(5), Duration::from_secs(600)).await.unwrap_err();
        match err {
            CaptureError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 6);
                assert_eq!(last.kind(), "StreamResolutionError");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(file_utils::list_files(dir.path(), &["png", "jpg"]).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn decode_error_reopens_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Opener::default();
        opener.frames.lock().unwrap().push_back(Err(anyhow!("connection reset")));
        let resolver = Resolver::default();
        let acq = acquirer(dir.path(), resolver, opener, 1);

        assert_eq!(acq.run(1, Duration::from_secs(5), Duration::from_secs(600)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let acq = acquirer(dir.path(), Resolver::default(), Opener::default(), 100);

        let err = acq.run(100, Duration::from_secs(5), Duration::from_secs(12)).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeadlineExceeded(_)));
        // ticks at 0, 5 and 10 seconds made it to disk
        assert_eq!(file_utils::list_files(dir.path(), &["png", "jpg"]).unwrap().len(), 3);
    }
}
