use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::CaptureError;
use crate::core::frame::CaptureMode;
use crate::shared::constants;

/// Tunables for the capture engine.
///
/// Every field has a default so a config file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retries allowed per historical offset before it is given up.
    pub max_attempts: u32,
    /// Retries allowed for the live run before it fails fatally.
    pub live_max_attempts: u32,
    pub navigation_timeout_secs: f64,
    pub consent_wait_secs: f64,
    pub consent_poll_ms: u64,
    /// Flat-progress window after which playback counts as stalled.
    pub stall_window_secs: f64,
    /// Number of samples taken across the stall window.
    pub stall_samples: usize,
    /// Smallest forward step of `currentTime` that counts as progress.
    pub min_progress_secs: f64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub session_deadline_secs: f64,
    /// Live run deadline; derived from `limit * interval` when unset.
    pub live_deadline_secs: Option<f64>,
    pub live_frame_wait_secs: f64,
    /// Extra seconds skipped forward on every reload of a historical offset.
    pub reload_seek_nudge_secs: f64,
    /// Playback step between consecutive frames of one offset.
    pub frame_step_secs: f64,
    pub min_frame_bytes: usize,
    pub min_variance: f64,
    pub variance_stride: u32,
    pub headless: bool,
    pub parallel_offsets: usize,
    pub consent_labels: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            live_max_attempts: 5,
            navigation_timeout_secs: 30.0,
            consent_wait_secs: 5.0,
            consent_poll_ms: 500,
            stall_window_secs: 30.0,
            stall_samples: 6,
            min_progress_secs: 0.1,
            backoff_base_ms: 1_000,
            backoff_max_ms: 8_000,
            session_deadline_secs: 300.0,
            live_deadline_secs: None,
            live_frame_wait_secs: 10.0,
            reload_seek_nudge_secs: 10.0,
            frame_step_secs: 0.2,
            min_frame_bytes: 20_000,
            min_variance: 25.0,
            variance_stride: 4,
            headless: true,
            parallel_offsets: 1,
            consent_labels: constants::CONSENT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl EngineConfig {
    /// Reads the first config file found: the explicit path, then
    /// `torikamera.config.json` in the working directory, then the per-user
    /// config directory. Falls back to defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                tracing::info!(path = %candidate.display(), "loading config");
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(constants::CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(constants::APP_NAME).join("config.json"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.stall_samples == 0 {
            return Err(CaptureError::InvalidRequest("stall_samples must be at least 1".into()));
        }
        if self.stall_window_secs <= 0.0 || !self.stall_window_secs.is_finite() {
            return Err(CaptureError::InvalidRequest("stall_window_secs must be positive".into()));
        }
        if self.parallel_offsets == 0 {
            return Err(CaptureError::InvalidRequest("parallel_offsets must be at least 1".into()));
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        secs(self.navigation_timeout_secs)
    }

    pub fn consent_wait(&self) -> Duration {
        secs(self.consent_wait_secs)
    }

    pub fn consent_poll(&self) -> Duration {
        Duration::from_millis(self.consent_poll_ms.max(1))
    }

    pub fn stall_window(&self) -> Duration {
        secs(self.stall_window_secs)
    }

    pub fn session_deadline(&self) -> Duration {
        secs(self.session_deadline_secs)
    }

    pub fn live_frame_wait(&self) -> Duration {
        secs(self.live_frame_wait_secs)
    }

    pub fn live_deadline(&self, limit: u32, interval: Duration) -> Duration {
        match self.live_deadline_secs {
            Some(value) => secs(value),
            None => interval
                .checked_mul(limit)
                .and_then(|run| run.checked_add(Duration::from_secs(300)))
                .unwrap_or(Duration::MAX),
        }
    }

    pub fn reload_seek_nudge(&self) -> Duration {
        secs(self.reload_seek_nudge_secs)
    }

    pub fn frame_step(&self) -> Duration {
        secs(self.frame_step_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Live { interval: Duration },
    Historical { offsets: Vec<Duration> },
}

/// Immutable parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    limit: u32,
    kind: RequestKind,
}

impl CaptureRequest {
    pub fn live(limit: u32, interval: Duration) -> Result<Self, CaptureError> {
        Self::check_limit(limit)?;
        if interval.is_zero() {
            return Err(CaptureError::InvalidRequest("interval must be greater than zero".into()));
        }
        Ok(Self { limit, kind: RequestKind::Live { interval } })
    }

    pub fn historical(limit: u32, offsets: Vec<Duration>) -> Result<Self, CaptureError> {
        Self::check_limit(limit)?;
        if offsets.is_empty() {
            return Err(CaptureError::InvalidRequest("at least one history offset is required".into()));
        }
        Ok(Self { limit, kind: RequestKind::Historical { offsets } })
    }

    /// Historical request from offsets given in hours, as typed on the command line.
    pub fn historical_hours(limit: u32, hours: &[f64]) -> Result<Self, CaptureError> {
        let offsets = hours
            .iter()
            .map(|h| {
                Duration::try_from_secs_f64(h * 3600.0).map_err(|_| {
                    CaptureError::InvalidRequest(format!("offset {h}h must be a non-negative number"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::historical(limit, offsets)
    }

    fn check_limit(limit: u32) -> Result<(), CaptureError> {
        if limit == 0 {
            return Err(CaptureError::InvalidRequest("limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn mode(&self) -> CaptureMode {
        match self.kind {
            RequestKind::Live { .. } => CaptureMode::Live,
            RequestKind::Historical { .. } => CaptureMode::Historical,
        }
    }

    /// Frames allotted to each offset, in order. The shares sum to `limit`
    /// when it exceeds the offset count; otherwise each offset is allotted one
    /// frame and the shared budget decides which ones actually get it.
    pub fn offset_shares(&self) -> Vec<u32> {
        let RequestKind::Historical { offsets } = &self.kind else {
            return Vec::new();
        };
        let n = offsets.len() as u32;
        if self.limit <= n {
            return vec![1; offsets.len()];
        }
        (0..n)
            .map(|i| self.limit / n + u32::from(i < self.limit % n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_limit_and_zero_interval() {
        assert!(CaptureRequest::live(0, Duration::from_secs(5)).is_err());
        assert!(CaptureRequest::live(5, Duration::ZERO).is_err());
        assert!(CaptureRequest::live(5, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn rejects_empty_and_negative_offsets() {
        assert!(CaptureRequest::historical(1, Vec::new()).is_err());
        assert!(CaptureRequest::historical_hours(1, &[-0.5]).is_err());
        assert!(CaptureRequest::historical_hours(1, &[f64::NAN]).is_err());

        let req = CaptureRequest::historical_hours(1, &[6.0, 0.0]).unwrap();
        assert_eq!(
            req.kind(),
            &RequestKind::Historical { offsets: vec![Duration::from_secs(21_600), Duration::ZERO] }
        );
        assert_eq!(req.mode(), CaptureMode::Historical);
    }

    #[test]
    fn shares_spread_limit_over_offsets() {
        let req = CaptureRequest::historical_hours(7, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(req.offset_shares(), vec![3, 2, 2]);

        let req = CaptureRequest::historical_hours(2, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(req.offset_shares(), vec![1, 1, 1]);

        let req = CaptureRequest::live(3, Duration::from_secs(1)).unwrap();
        assert!(req.offset_shares().is_empty());
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "max_attempts": 5, "headless": false }"#).unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert!(!config.headless);
        assert_eq!(config.stall_samples, 6);
        assert_eq!(config.stall_window(), Duration::from_secs(30));
        assert_eq!(config.min_frame_bytes, 20_000);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "stall_samples": 0 }"#).unwrap();
        assert!(EngineConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn live_deadline_defaults_to_run_length_plus_slack() {
        let config = EngineConfig::default();
        assert_eq!(
            config.live_deadline(5, Duration::from_secs(5)),
            Duration::from_secs(325)
        );
    }

    #[test]
    fn live_deadline_saturates_on_huge_intervals() {
        let config = EngineConfig::default();
        assert_eq!(config.live_deadline(2, Duration::from_secs(u64::MAX / 2)), Duration::MAX);
        assert_eq!(config.live_deadline(1, Duration::from_secs(u64::MAX - 10)), Duration::MAX);
    }
}
