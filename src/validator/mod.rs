use rayon::prelude::*;

use crate::core::config::EngineConfig;
use crate::core::error::CaptureError;

/// Outcome of checking a captured image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Valid { bytes: usize, variance: f64 },
    Degenerate { bytes: usize, variance: f64 },
}

impl Verdict {
    pub fn into_result(self) -> Result<(), CaptureError> {
        match self {
            Verdict::Valid { .. } => Ok(()),
            Verdict::Degenerate { bytes, variance } => {
                Err(CaptureError::DegenerateFrame { bytes, variance })
            }
        }
    }
}

/// Rejects frames grabbed before the player rendered anything: tiny encodings
/// and images whose luminance is (nearly) flat.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    min_bytes: usize,
    min_variance: f64,
    stride: u32,
}

impl FrameValidator {
    pub fn new(min_bytes: usize, min_variance: f64, stride: u32) -> Self {
        Self { min_bytes, min_variance, stride: stride.max(1) }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.min_frame_bytes, config.min_variance, config.variance_stride)
    }

    pub fn check(&self, bytes: &[u8]) -> Verdict {
        let size = bytes.len();
        if size < self.min_bytes {
            return Verdict::Degenerate { bytes: size, variance: 0.0 };
        }

        let variance = match self.luma_variance(bytes) {
            Some(v) => v,
            None => return Verdict::Degenerate { bytes: size, variance: 0.0 },
        };

        if variance < self.min_variance {
            Verdict::Degenerate { bytes: size, variance }
        } else {
            Verdict::Valid { bytes: size, variance }
        }
    }

    /// Variance of 8-bit luma sampled every `stride` pixels in both directions.
    /// `None` when the bytes do not decode to a non-empty image.
    fn luma_variance(&self, bytes: &[u8]) -> Option<f64> {
        let image = image::load_from_memory(bytes).ok()?.to_luma8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let stride = self.stride as usize;
        let (count, sum, sum_sq) = (0..height as usize)
            .into_par_iter()
            .step_by(stride)
            .map(|y| {
                let mut acc = (0u64, 0u64, 0u64);
                for x in (0..width).step_by(stride) {
                    let v = image.get_pixel(x, y as u32).0[0] as u64;
                    acc.0 += 1;
                    acc.1 += v;
                    acc.2 += v * v;
                }
                acc
            })
            .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = sum as f64 / n;
        Some((sum_sq as f64 / n - mean * mean).max(0.0))
    }
}
