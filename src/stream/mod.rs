//! Live mode: resolve the broadcast to a media URL and sample it on a timer.

pub mod acquirer;
pub mod resolver;

use anyhow::Result;
use async_trait::async_trait;

pub use acquirer::StreamModeAcquirer;
pub use resolver::{StreamResolver, YtDlpResolver};

/// Decoded live stream.
#[async_trait]
pub trait LiveFrameSource: Send {
    /// Most recent frame not returned before, encoded as an image file.
    async fn next_frame(&mut self) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait LiveSourceOpener: Send + Sync {
    async fn open(&self, media_url: &str) -> Result<Box<dyn LiveFrameSource>>;
}
