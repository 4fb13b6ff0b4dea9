use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Live,
    Historical,
}

/// Where in the broadcast a frame came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameTag {
    /// Live sampling, strictly increasing per run.
    Sequence(u64),
    /// Historical extraction: the requested offset and the frame number within it.
    Offset { offset: Duration, index: u32 },
}

/// One captured still, encoded (PNG or JPEG).
///
/// Built by the extraction step of a session and handed to the writer by value,
/// so the session keeps no reference once it is persisted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Local>,
    pub tag: FrameTag,
}

impl Frame {
    pub fn live(bytes: Vec<u8>, sequence_index: u64) -> Self {
        Self { bytes, captured_at: Local::now(), tag: FrameTag::Sequence(sequence_index) }
    }

    pub fn historical(bytes: Vec<u8>, offset: Duration, index: u32) -> Self {
        Self { bytes, captured_at: Local::now(), tag: FrameTag::Offset { offset, index } }
    }

    pub fn mode(&self) -> CaptureMode {
        match self.tag {
            FrameTag::Sequence(_) => CaptureMode::Live,
            FrameTag::Offset { .. } => CaptureMode::Historical,
        }
    }

    /// Broadcast time the frame depicts: capture time for live frames,
    /// `captured_at - offset` for historical ones.
    pub fn depicted_at(&self) -> DateTime<Local> {
        match self.tag {
            FrameTag::Sequence(_) => self.captured_at,
            FrameTag::Offset { offset, .. } => chrono::Duration::from_std(offset)
                .ok()
                .and_then(|back| self.captured_at.checked_sub_signed(back))
                .unwrap_or(self.captured_at),
        }
    }
}
