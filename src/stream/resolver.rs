use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use std::time::Duration;
use tokio::process::Command;

use crate::shared::constants;

lazy_static! {
    // HTML5 allows unquoted attributes, e.g. src=/js/app.04eec67a.js
    static ref APP_SCRIPT: Regex = Regex::new(r#"src=["']?(/js/app\.[a-z0-9]+\.js)"#).unwrap();
    static ref EMBED_ID: Regex = Regex::new(r"youtube\.com/embed/([a-zA-Z0-9_-]{11})").unwrap();
}

/// Turns the configured source into something a player or decoder can open.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Page URL the browser loads for historical capture.
    async fn watch_url(&self, source_url: &str) -> Result<String>;

    /// Direct media URL the live decoder opens.
    async fn media_url(&self, watch_url: &str) -> Result<String>;
}

pub fn find_app_script(html: &str) -> Option<&str> {
    APP_SCRIPT.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str())
}

pub fn find_embed_id(js: &str) -> Option<&str> {
    EMBED_ID.captures(js).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Scrapes the portal bundle for the embedded YouTube id, then asks `yt-dlp`
/// for the stream URL.
pub struct YtDlpResolver {
    client: reqwest::Client,
    yt_dlp: String,
}

impl YtDlpResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, yt_dlp: constants::YT_DLP_BIN.to_string() })
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {}", url))?;
        response.text().await.with_context(|| format!("Failed to read body of {}", url))
    }

    async fn scrape_portal(&self, base: Url) -> Result<String> {
        let html = self.fetch(base.clone()).await?;
        let script = find_app_script(&html).ok_or_else(|| anyhow!("no app script in {}", base))?;
        let script_url = base.join(script)?;
        tracing::info!(url = %script_url, "found portal app script");

        let js = self.fetch(script_url.clone()).await?;
        let id = find_embed_id(&js).ok_or_else(|| anyhow!("no YouTube embed in {}", script_url))?;
        Ok(format!("{}{}", constants::YOUTUBE_WATCH_PREFIX, id))
    }
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn watch_url(&self, source_url: &str) -> Result<String> {
        let url = Url::parse(source_url).with_context(|| format!("Invalid source URL: {}", source_url))?;
        let is_portal = url.host_str().map_or(false, |h| h.ends_with(constants::PORTAL_HOST));
        if !is_portal {
            return Ok(source_url.to_string());
        }

        match self.scrape_portal(url).await {
            Ok(watch) => {
                tracing::info!(url = %watch, "resolved embedded stream");
                Ok(watch)
            }
            Err(e) => {
                tracing::warn!("portal scrape failed, using source URL as is: {:#}", e);
                Ok(source_url.to_string())
            }
        }
    }

    async fn media_url(&self, watch_url: &str) -> Result<String> {
        tracing::info!(url = watch_url, "resolving media URL with yt-dlp");
        let output = Command::new(&self.yt_dlp)
            .args(["-f", "best", "-g", "--no-warnings", watch_url])
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.yt_dlp,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{} printed no URL for {}", self.yt_dlp, watch_url))
    }
}
