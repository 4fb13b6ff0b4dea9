//! Headless browser capability used by historical capture.
//!
//! The controller only talks to [`BrowserLauncher`] and [`BrowserPage`]; the
//! Chromium implementation lives in [`chromium`] and tests drive a scripted
//! fake instead.

pub mod chromium;
pub mod consent;
pub mod overrides;
pub mod scripts;
pub mod stall;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

pub use chromium::ChromiumLauncher;
pub use consent::ConsentHandler;
pub use overrides::DomOverrideInjector;
pub use stall::{PageProbe, Playback, StallMonitor};

/// A visible element returned by a selector query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElementInfo {
    pub index: usize,
    pub text: String,
}

/// One browser tab.
#[async_trait]
pub trait BrowserPage: Send {
    /// Loads `url` and waits for the load to finish.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluates `script` in the page and returns its JSON value (`null` for undefined).
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    async fn visible_elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>>;

    /// Clicks `element` from an earlier [`visible_elements`](Self::visible_elements)
    /// query, failing if the page re-rendered it with different text.
    async fn click(&mut self, selector: &str, element: &ElementInfo) -> Result<()>;

    /// PNG clipped to the bounding box of the first element matching `selector`.
    async fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>>;

    async fn close(&mut self) -> Result<()>;
}

/// Hands out fresh, independent pages.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>>;
}
