use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{scripts, BrowserLauncher, BrowserPage, ElementInfo};
use crate::shared::constants;

/// Chromium driven over CDP. Each `open_page` is a new tab with its own DOM,
/// so parallel sessions never see each other's overrides or consent state.
pub struct ChromiumLauncher {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl ChromiumLauncher {
    pub async fn launch(headless: bool) -> Result<Self> {
        let viewport = Viewport {
            width: constants::VIEWPORT_WIDTH,
            height: constants::VIEWPORT_HEIGHT,
            ..Default::default()
        };
        let mut builder = BrowserConfig::builder()
            .window_size(constants::VIEWPORT_WIDTH, constants::VIEWPORT_HEIGHT)
            .viewport(viewport);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {}", e))?;

        tracing::info!(headless, "launching Chromium");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("chromium handler event error: {}", e);
                }
            }
            tracing::debug!("chromium handler exited");
        });

        Ok(Self { browser, handler_task })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.browser.close().await.context("Failed to close Chromium")?;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;
        Ok(Box::new(ChromiumPage { page, closed: false }))
    }
}

struct ChromiumPage {
    page: Page,
    closed: bool,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to load {}", url))?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await.context("Script evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn visible_elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        let value = self.evaluate(&scripts::visible_elements(selector)).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).context("Unexpected element listing")
    }

    async fn click(&mut self, selector: &str, element: &ElementInfo) -> Result<()> {
        let clicked = self
            .evaluate(&scripts::click_element(selector, element.index, &element.text))
            .await
            .with_context(|| format!("Failed to click {}", selector))?;
        if clicked.as_bool() != Some(true) {
            bail!("{} #{} no longer reads {:?}", selector, element.index, element.text);
        }
        Ok(())
    }

    async fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("Failed to find {}", selector))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .with_context(|| format!("Failed to screenshot {}", selector))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page.clone().close().await.context("Failed to close tab")?;
        Ok(())
    }
}
