use std::time::Duration;
use thiserror::Error;

/// Failures of the capture engine.
///
/// Collaborators (browser, resolver, decoder) report `anyhow::Error`; the
/// engine folds those into one of these kinds at the call site so the retry
/// policy can act on the kind alone.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("consent dialog could not be dismissed: {0}")]
    ConsentDismiss(String),

    #[error("playback stalled for {window:?} ({samples} flat samples)")]
    StallTimeout { window: Duration, samples: usize },

    #[error("degenerate frame ({bytes} bytes, variance {variance:.1})")]
    DegenerateFrame { bytes: usize, variance: f64 },

    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<CaptureError> },

    #[error("stream resolution failed: {0}")]
    StreamResolution(String),

    #[error("cannot write frame: {0}")]
    WriteFailure(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("session deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("capture cancelled")]
    Cancelled,

    #[error("invalid capture request: {0}")]
    InvalidRequest(String),
}

impl CaptureError {
    /// Stable label used in run reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Navigation(_) => "NavigationError",
            CaptureError::ConsentDismiss(_) => "ConsentDismissFailure",
            CaptureError::StallTimeout { .. } => "StallTimeout",
            CaptureError::DegenerateFrame { .. } => "DegenerateFrame",
            CaptureError::RetryExhausted { .. } => "RetryExhausted",
            CaptureError::StreamResolution(_) => "StreamResolutionError",
            CaptureError::WriteFailure(_) => "WriteFailure",
            CaptureError::BrowserUnavailable(_) => "BrowserUnavailable",
            CaptureError::DeadlineExceeded(_) => "DeadlineExceeded",
            CaptureError::Cancelled => "Cancelled",
            CaptureError::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// Transient failures that spend one unit of a session's attempt budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::Navigation(_)
                | CaptureError::StallTimeout { .. }
                | CaptureError::DegenerateFrame { .. }
                | CaptureError::StreamResolution(_)
        )
    }

    /// Failures that abort the whole run instead of a single unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::WriteFailure(_)
                | CaptureError::BrowserUnavailable(_)
                | CaptureError::Cancelled
                | CaptureError::InvalidRequest(_)
        )
    }
}
