use super::BrowserPage;
use crate::core::error::CaptureError;
use crate::shared::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    Applied,
    AlreadyPresent,
}

/// Makes the video surface fill the viewport and hides everything else.
///
/// All effects live in one stylesheet with a fixed id. Injecting it again is a
/// no-op, and a fresh page load starts without it, so the injector runs after
/// every navigation.
#[derive(Debug, Clone)]
pub struct DomOverrideInjector {
    inject_script: String,
    check_script: String,
}

impl Default for DomOverrideInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl DomOverrideInjector {
    pub fn new() -> Self {
        let css = Self::stylesheet();
        let css_literal = serde_json::to_string(&css).unwrap_or_else(|_| "\"\"".to_string());
        let id = constants::OVERRIDE_STYLE_ID;

        let inject_script = format!(
            "(() => {{ \
                if (document.getElementById('{id}')) return 'present'; \
                const style = document.createElement('style'); \
                style.id = '{id}'; \
                style.textContent = {css_literal}; \
                (document.head || document.documentElement).appendChild(style); \
                const player = document.querySelector('#movie_player'); \
                if (player) player.classList.add('ytp-autohide'); \
                return 'applied'; \
            }})()"
        );
        let check_script = format!("!!document.getElementById('{id}')");

        Self { inject_script, check_script }
    }

    fn stylesheet() -> String {
        let hidden = constants::PAGE_CHROME_SELECTORS
            .iter()
            .chain(constants::PLAYER_CHROME_SELECTORS)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "html, body {{ margin: 0 !important; padding: 0 !important; background: #000 !important; overflow: hidden !important; }}\n\
             #movie_player {{ position: fixed !important; top: 0 !important; left: 0 !important; \
             width: 100vw !important; height: 100vh !important; z-index: 2147483647 !important; \
             margin: 0 !important; padding: 0 !important; background: #000 !important; }}\n\
             video {{ object-fit: cover !important; width: 100vw !important; height: 100vh !important; \
             top: 0 !important; left: 0 !important; }}\n\
             {hidden} {{ display: none !important; }}\n"
        )
    }

    pub async fn apply(&self, page: &mut dyn BrowserPage) -> Result<OverrideOutcome, CaptureError> {
        let outcome = page
            .evaluate(&self.inject_script)
            .await
            .map_err(|e| CaptureError::Navigation(format!("override injection failed: {:#}", e)))?;

        let outcome = match outcome.as_str() {
            Some("applied") => OverrideOutcome::Applied,
            Some("present") => OverrideOutcome::AlreadyPresent,
            other => {
                return Err(CaptureError::Navigation(format!(
                    "override injection returned {:?}",
                    other
                )))
            }
        };

        let present = page
            .evaluate(&self.check_script)
            .await
            .map_err(|e| CaptureError::Navigation(format!("override check failed: {:#}", e)))?;
        if present.as_bool() != Some(true) {
            return Err(CaptureError::Navigation("override stylesheet missing after injection".into()));
        }

        tracing::debug!(?outcome, "dom overrides");
        Ok(outcome)
    }
}
