use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::error::CaptureError;
use crate::core::frame::{Frame, FrameTag};
use crate::shared::constants;
use crate::utils::{file_utils, time_utils};

/// Persists validated frames under the raw-data directory.
///
/// Names embed the mode, the sequence index or offset, and a millisecond
/// timestamp. Files are created with create-new semantics and a clash gets a
/// numeric suffix, so an existing file is never overwritten.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let dir = dir.into();
        file_utils::ensure_writable_dir(&dir)
            .map_err(|e| CaptureError::WriteFailure(format!("{:#}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_stem(frame: &Frame) -> String {
        let timestamp = frame.depicted_at().format("%Y%m%d_%H%M%S_%3f");
        let tag = match frame.tag {
            FrameTag::Sequence(index) => format!("live_s{:05}", index),
            FrameTag::Offset { offset, index } => {
                format!("h{}h_f{}", time_utils::format_hours(offset).replace('.', "p"), index)
            }
        };
        format!("{}_{}_{}", constants::FRAME_FILE_PREFIX, timestamp, tag)
    }

    fn extension(bytes: &[u8]) -> &'static str {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => "png",
            _ => "jpg",
        }
    }

    /// Takes ownership of the frame and writes it out. Any I/O error is a
    /// `WriteFailure`, which aborts the run.
    pub fn write(&self, frame: Frame) -> Result<PathBuf, CaptureError> {
        let stem = Self::file_stem(&frame);
        let ext = Self::extension(&frame.bytes);
        let mode = frame.mode();

        for suffix in 0u32..1000 {
            let name = if suffix == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}-{}.{}", stem, suffix, ext)
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&frame.bytes)
                        .and_then(|_| file.flush())
                        .map_err(|e| CaptureError::WriteFailure(format!("{}: {}", path.display(), e)))?;
                    tracing::info!(?mode, path = %path.display(), bytes = frame.bytes.len(), "saved frame");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(CaptureError::WriteFailure(format!("{}: {}", path.display(), e)));
                }
            }
        }

        Err(CaptureError::WriteFailure(format!("no free file name for {}", stem)))
    }
}
