use tokio::time::Instant;

use crate::core::error::CaptureError;

/// States of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Navigating,
    AwaitingConsent,
    InjectingOverrides,
    Buffering,
    StallDetected,
    Reloading,
    Capturing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Edges of the session state machine. Any non-terminal state may fail.
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        if to == Failed {
            return true;
        }
        matches!(
            (self, to),
            (Navigating, AwaitingConsent)
                | (Navigating, Reloading)
                // live runs: media source opened, waiting for the first tick
                | (Navigating, Buffering)
                | (AwaitingConsent, InjectingOverrides)
                // player never came up behind the dialog
                | (AwaitingConsent, Reloading)
                | (InjectingOverrides, Buffering)
                | (InjectingOverrides, Reloading)
                | (Buffering, StallDetected)
                | (Buffering, Capturing)
                | (StallDetected, Reloading)
                | (Reloading, Navigating)
                | (Capturing, Completed)
                | (Capturing, Buffering)
                | (Capturing, Reloading)
                // live runs tick from one capture straight into the next
                | (Capturing, Capturing)
        )
    }
}

/// Mutable state of one live run or one historical offset.
#[derive(Debug)]
pub struct CaptureSession {
    label: String,
    state: SessionState,
    attempt_count: u32,
    captured_count: u32,
    share: u32,
    max_attempts: u32,
    started_at: Instant,
}

impl CaptureSession {
    pub fn new(label: impl Into<String>, share: u32, max_attempts: u32) -> Self {
        Self {
            label: label.into(),
            state: SessionState::Navigating,
            attempt_count: 0,
            captured_count: 0,
            share,
            max_attempts,
            started_at: Instant::now(),
        }
    }

    pub fn transition(&mut self, to: SessionState) {
        if !self.state.can_transition(to) {
            tracing::warn!(unit = %self.label, from = ?self.state, ?to, "unexpected session transition");
        }
        tracing::debug!(unit = %self.label, from = ?self.state, ?to, "session transition");
        self.state = to;
    }

    /// Spends one attempt on a retryable failure. Once the count exceeds the
    /// configured maximum the session fails with `RetryExhausted`.
    pub fn record_failure(&mut self, cause: CaptureError) -> Result<u32, CaptureError> {
        debug_assert!(cause.is_retryable(), "{} is not retryable", cause.kind());
        self.attempt_count += 1;
        tracing::warn!(
            unit = %self.label,
            attempt = self.attempt_count,
            max = self.max_attempts,
            kind = cause.kind(),
            "{}",
            cause
        );
        if self.attempt_count > self.max_attempts {
            self.transition(SessionState::Failed);
            return Err(CaptureError::RetryExhausted {
                attempts: self.attempt_count,
                last: Box::new(cause),
            });
        }
        Ok(self.attempt_count)
    }

    pub fn record_capture(&mut self) {
        self.captured_count += 1;
        debug_assert!(self.captured_count <= self.share);
    }

    pub fn wants_more(&self) -> bool {
        self.captured_count < self.share
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn captured_count(&self) -> u32 {
        self.captured_count
    }

    pub fn share(&self) -> u32 {
        self.share
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}
