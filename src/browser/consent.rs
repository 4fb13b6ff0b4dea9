use std::time::Duration;
use tokio::time::Instant;

use super::BrowserPage;
use crate::core::config::EngineConfig;
use crate::core::error::CaptureError;
use crate::shared::constants;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentOutcome {
    Dismissed { label: String },
    Absent,
}

/// Dismisses the cookie-consent overlay by clicking its reject button.
///
/// Polls for at most `wait`; a page without a dialog (prior consent, other
/// region) simply reports `Absent`.
#[derive(Debug, Clone)]
pub struct ConsentHandler {
    labels: Vec<String>,
    wait: Duration,
    poll: Duration,
}

impl ConsentHandler {
    pub fn new(labels: Vec<String>, wait: Duration, poll: Duration) -> Self {
        let labels = labels.into_iter().map(|l| l.to_lowercase()).collect();
        Self { labels, wait, poll }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.consent_labels.clone(), config.consent_wait(), config.consent_poll())
    }

    fn matching_label(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.labels
            .iter()
            .find(|label| text.contains(label.as_str()))
            .map(String::as_str)
    }

    pub async fn dismiss(&self, page: &mut dyn BrowserPage) -> Result<ConsentOutcome, CaptureError> {
        let deadline = Instant::now() + self.wait;

        loop {
            match page.visible_elements(constants::CONSENT_BUTTON_SELECTOR).await {
                Ok(buttons) => {
                    let hit = buttons
                        .iter()
                        .find_map(|b| self.matching_label(&b.text).map(|_| b));
                    if let Some(button) = hit {
                        tracing::info!(text = %button.text, "dismissing consent dialog");
                        page.click(constants::CONSENT_BUTTON_SELECTOR, button)
                            .await
                            .map_err(|e| CaptureError::ConsentDismiss(format!("{:#}", e)))?;
                        return Ok(ConsentOutcome::Dismissed { label: button.text.clone() });
                    }
                }
                Err(e) => tracing::debug!("consent scan failed: {:#}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(ConsentOutcome::Absent);
            }
            tokio::time::sleep(self.poll.min(deadline - now)).await;
        }
    }
}
