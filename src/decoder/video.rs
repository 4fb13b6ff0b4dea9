use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::stream::{LiveFrameSource, LiveSourceOpener};

#[cfg(feature = "opencv")]
pub use imp::{OpenCvSource, VideoDecoder};

/// Opens media URLs with OpenCV's `VideoCapture`.
#[derive(Debug, Clone)]
pub struct OpenCvOpener {
    frame_wait: Duration,
}

impl OpenCvOpener {
    pub fn new(frame_wait: Duration) -> Self {
        Self { frame_wait }
    }
}

#[async_trait]
impl LiveSourceOpener for OpenCvOpener {
    #[cfg(feature = "opencv")]
    async fn open(&self, media_url: &str) -> Result<Box<dyn LiveFrameSource>> {
        let url = media_url.to_string();
        let decoder = tokio::task::spawn_blocking(move || VideoDecoder::open(&url))
            .await
            .map_err(|e| anyhow!("decoder open task failed: {}", e))??;
        Ok(Box::new(OpenCvSource::start(decoder, self.frame_wait)))
    }

    #[cfg(not(feature = "opencv"))]
    async fn open(&self, media_url: &str) -> Result<Box<dyn LiveFrameSource>> {
        let _ = self.frame_wait;
        bail!("cannot open {}: built without the `opencv` feature", media_url)
    }
}

#[cfg(feature = "opencv")]
mod imp {
    use super::*;
    use opencv::{core, imgcodecs, prelude::*, videoio};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    use crate::core::frame_buffer::LatestFrame;

    const POLL: Duration = Duration::from_millis(20);
    const JPEG_QUALITY: i32 = 95;

    pub struct VideoDecoder {
        capture: videoio::VideoCapture,
        url: String,
    }

    impl VideoDecoder {
        pub fn open(url: &str) -> Result<Self> {
            // CAP_ANY lets OpenCV pick the backend (FFmpeg for network streams)
            let mut capture = videoio::VideoCapture::from_file(url, videoio::CAP_ANY)?;
            let _ = capture.set(videoio::CAP_PROP_HW_ACCELERATION, videoio::VIDEO_ACCELERATION_ANY as f64);

            if !capture.is_opened()? {
                bail!("Failed to open stream: {}", url);
            }

            let fps = capture.get(videoio::CAP_PROP_FPS)?;
            let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
            let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
            tracing::info!(width, height, fps, "stream opened");

            Ok(Self { capture, url: url.to_string() })
        }

        /// Reads frames until the stream ends or `running` is cleared,
        /// publishing each one into `latest`.
        pub fn spawn_decoding_thread(
            mut self,
            latest: LatestFrame<Mat>,
            running: Arc<AtomicBool>,
        ) -> std::thread::JoinHandle<()> {
            std::thread::spawn(move || {
                tracing::debug!(url = %self.url, "decoder thread started");
                let mut decoded: u64 = 0;
                while running.load(Ordering::Relaxed) {
                    let mut frame = Mat::default();
                    match self.capture.read(&mut frame) {
                        Ok(true) if !frame.empty() => {
                            decoded += 1;
                            latest.publish(frame);
                        }
                        Ok(_) => {
                            tracing::warn!("stream ended after {} frames", decoded);
                            break;
                        }
                        Err(e) => {
                            tracing::error!("decoding error: {}", e);
                            break;
                        }
                    }
                }
                running.store(false, Ordering::Relaxed);
                tracing::debug!("decoder thread exiting");
            })
        }
    }

    /// Live source backed by a decoder thread.
    pub struct OpenCvSource {
        latest: LatestFrame<Mat>,
        running: Arc<AtomicBool>,
        frame_wait: Duration,
    }

    impl OpenCvSource {
        pub fn start(decoder: VideoDecoder, frame_wait: Duration) -> Self {
            let latest = LatestFrame::new();
            let running = Arc::new(AtomicBool::new(true));
            // detached; clearing `running` ends it after the current read
            let _ = decoder.spawn_decoding_thread(latest.clone(), Arc::clone(&running));
            Self { latest, running, frame_wait }
        }
    }

    fn encode_jpeg(frame: &Mat) -> Result<Vec<u8>> {
        let mut buf = core::Vector::<u8>::new();
        let params = core::Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
        if !imgcodecs::imencode(".jpg", frame, &mut buf, &params)? {
            bail!("JPEG encoding failed");
        }
        Ok(buf.to_vec())
    }

    #[async_trait]
    impl LiveFrameSource for OpenCvSource {
        async fn next_frame(&mut self) -> Result<Vec<u8>> {
            let deadline = Instant::now() + self.frame_wait;
            loop {
                if let Some(frame) = self.latest.take() {
                    return encode_jpeg(&frame);
                }
                if !self.running.load(Ordering::Relaxed) {
                    bail!("decoder stopped");
                }
                if Instant::now() >= deadline {
                    return Err(anyhow!("no frame decoded within {:?}", self.frame_wait));
                }
                tokio::time::sleep(POLL).await;
            }
        }
    }

    impl Drop for OpenCvSource {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(all(test, not(feature = "opencv")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_without_decoder_support() {
        let opener = OpenCvOpener::new(Duration::from_secs(1));
        assert!(opener.open("https://example.test/live.m3u8").await.is_err());
    }
}
