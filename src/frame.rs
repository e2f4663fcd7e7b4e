//! Audio frame type and level utilities
//!
//! All processing runs on interleaved 32-bit float samples. A frame is
//! immutable once produced by the engine; stages operate on plain mutable
//! slices internally and wrap the result at the output boundary.

use crate::error::{CrescendoError, Result};

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `f32::NEG_INFINITY` for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate a one-pole smoothing coefficient from a time constant
///
/// `coeff = exp(-1 / (time_ms * sample_rate / 1000))`; the smoothed value
/// reaches ~63% of its target after `time_ms`.
#[inline]
pub fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * sample_rate / 1000.0;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Interleaved audio frame
///
/// Samples are stored in interleaved format: [L0, R0, L1, R1, ...].
/// This matches common audio file formats and simplifies I/O.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Interleaved sample data
    samples: Vec<f32>,
    /// Number of channels (1 = mono, 2 = stereo)
    num_channels: usize,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl AudioFrame {
    /// Create a silent frame with the given shape
    pub fn silent(num_channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; num_channels * num_samples],
            num_channels,
            sample_rate,
        }
    }

    /// Create a frame from existing interleaved samples
    pub fn from_interleaved(
        samples: Vec<f32>,
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(CrescendoError::InvalidAudio {
                reason: "channel count must be at least 1".to_string(),
            });
        }
        if samples.len() % num_channels != 0 {
            return Err(CrescendoError::InvalidAudio {
                reason: format!(
                    "sample count {} is not divisible by channel count {}",
                    samples.len(),
                    num_channels
                ),
            });
        }
        Ok(Self {
            samples,
            num_channels,
            sample_rate,
        })
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of samples per channel
    pub fn num_samples(&self) -> usize {
        self.samples.len() / self.num_channels
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// Get a reference to all interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the frame, returning the interleaved samples
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Get a sample at the given position and channel
    pub fn get(&self, frame: usize, channel: usize) -> Option<f32> {
        if frame < self.num_samples() && channel < self.num_channels {
            Some(self.samples[frame * self.num_channels + channel])
        } else {
            None
        }
    }

    /// Check if the frame contains only finite samples
    pub fn is_valid(&self) -> bool {
        self.samples.iter().all(|&s| s.is_finite())
    }

    /// Calculate peak level in dB for a channel
    pub fn peak_db(&self, channel: usize) -> f32 {
        if channel >= self.num_channels {
            return f32::NEG_INFINITY;
        }

        let peak = self
            .samples
            .iter()
            .skip(channel)
            .step_by(self.num_channels)
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max);

        linear_to_db(peak)
    }

    /// Calculate RMS level in dB for a channel
    pub fn rms_db(&self, channel: usize) -> f32 {
        if channel >= self.num_channels || self.num_samples() == 0 {
            return f32::NEG_INFINITY;
        }

        let sum_sq: f64 = self
            .samples
            .iter()
            .skip(channel)
            .step_by(self.num_channels)
            .map(|&s| (s as f64) * (s as f64))
            .sum();

        let rms = (sum_sq / self.num_samples() as f64).sqrt() as f32;
        linear_to_db(rms)
    }
}
