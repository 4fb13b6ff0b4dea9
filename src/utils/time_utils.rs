use std::time::Duration;

/// Bounded exponential backoff between retries of a session.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    /// Delay before retry number `attempt` (1-based): base, 2*base, 4*base, ... capped at max.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }

    pub async fn wait(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}

/// Formats an offset as hours the way it was typed: `6`, `0.5`, `1.25`.
pub fn format_hours(offset: Duration) -> String {
    let hours = offset.as_secs_f64() / 3600.0;
    let text = format!("{:.3}", hours);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let backoff = Backoff::from_millis(1_000, 8_000);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(4), Duration::from_secs(8));
        assert_eq!(backoff.delay(30), Duration::from_secs(8));
    }

    #[test]
    fn fixed_backoff_when_max_equals_base() {
        let backoff = Backoff::from_millis(500, 500);
        assert_eq!(backoff.delay(1), backoff.delay(5));
    }

    #[test]
    fn hours_formatting() {
        assert_eq!(format_hours(Duration::from_secs(6 * 3600)), "6");
        assert_eq!(format_hours(Duration::from_secs(1800)), "0.5");
        assert_eq!(format_hours(Duration::from_secs(4500)), "1.25");
        assert_eq!(format_hours(Duration::ZERO), "0");
    }
}
