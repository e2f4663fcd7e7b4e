//! Per-band dynamics processing
//!
//! Each band runs an independent feed-forward compressor: a peak envelope
//! tracked with exponential smoothing (attack coefficient when the level
//! rises, release when it falls) drives a hard-knee gain computer. Channels
//! are linked: detection uses the loudest channel so the stereo image does
//! not shift under compression.

use crate::frame::{db_to_linear, linear_to_db, time_to_coeff};
use crate::params::BandParams;

/// Floor for level detection; anything quieter counts as silence
const DETECTOR_FLOOR_DB: f32 = -96.0;

/// Envelope and gain-reduction state for one band
#[derive(Debug, Clone)]
struct BandState {
    /// Smoothed gain-reduction factor, linear, always within [0, 1]
    gain_reduction: f32,
}

impl Default for BandState {
    fn default() -> Self {
        Self {
            gain_reduction: 1.0,
        }
    }
}

/// Multi-band dynamics processor
pub struct Dynamics {
    sample_rate: u32,
    num_channels: usize,
    bands: Vec<BandState>,
}

impl Dynamics {
    pub fn new(num_bands: usize, sample_rate: u32, num_channels: usize) -> Self {
        Self {
            sample_rate,
            num_channels,
            bands: vec![BandState::default(); num_bands],
        }
    }

    /// Number of bands currently tracked
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Resize to a new band count, discarding old envelope state
    ///
    /// Called together with a crossover reconfiguration, at a block boundary.
    pub fn reconfigure(&mut self, num_bands: usize) {
        self.bands = vec![BandState::default(); num_bands];
    }

    /// Reset all envelope state to unity gain
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            *band = BandState::default();
        }
    }

    /// Current gain reduction for a band in dB (0 when not compressing)
    pub fn gain_reduction_db(&self, band: usize) -> f32 {
        match self.bands.get(band) {
            Some(state) if state.gain_reduction > 0.0 => {
                20.0 * state.gain_reduction.log10()
            }
            Some(_) => DETECTOR_FLOOR_DB,
            None => 0.0,
        }
    }

    /// Compress one band's interleaved block in place
    ///
    /// A ratio at the bypass sentinel leaves the samples and the band's
    /// envelope untouched, so the band output is bit-identical to the
    /// uncompressed signal.
    pub fn process_band(&mut self, band: usize, samples: &mut [f32], params: &BandParams) {
        let Some(state) = self.bands.get_mut(band) else {
            return;
        };
        if params.compressor_bypassed() {
            state.gain_reduction = 1.0;
            return;
        }

        let attack_coeff = time_to_coeff(params.attack_ms, self.sample_rate as f32);
        let release_coeff = time_to_coeff(params.release_ms, self.sample_rate as f32);
        let threshold = params.threshold_db;
        let ratio = params.ratio;
        let num_channels = self.num_channels;

        for frame in samples.chunks_mut(num_channels) {
            // Linked detection: loudest channel drives the gain computer
            let peak = frame.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
            let level_db = if peak > 0.0 {
                linear_to_db(peak).max(DETECTOR_FLOOR_DB)
            } else {
                DETECTOR_FLOOR_DB
            };

            // Hard-knee gain computer: output = threshold + (input - threshold) / ratio
            let target_gr_db = if level_db > threshold {
                (threshold + (level_db - threshold) / ratio) - level_db
            } else {
                0.0
            };
            let target_gr = db_to_linear(target_gr_db);

            // Attack when gain reduction deepens, release when it recovers
            let coeff = if target_gr < state.gain_reduction {
                attack_coeff
            } else {
                release_coeff
            };
            let smoothed = coeff * state.gain_reduction + (1.0 - coeff) * target_gr;
            state.gain_reduction = smoothed.clamp(0.0, 1.0);

            for sample in frame.iter_mut() {
                *sample *= state.gain_reduction;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BYPASS_RATIO;
    use approx::assert_relative_eq;

    fn loud_block(level: f32, frames: usize) -> Vec<f32> {
        vec![level; frames * 2]
    }

    fn band_params(threshold_db: f32, ratio: f32) -> BandParams {
        BandParams {
            gain_db: 0.0,
            threshold_db,
            ratio,
            attack_ms: 0.1,
            release_ms: 50.0,
        }
    }

    #[test]
    fn test_below_threshold_is_untouched_after_settling() {
        let mut dynamics = Dynamics::new(3, 48000, 2);
        // -40 dB signal, -18 dB threshold
        let mut block = loud_block(0.01, 4800);
        let original = block.clone();
        dynamics.process_band(1, &mut block, &band_params(-18.0, 4.0));

        assert_eq!(block, original, "signal below threshold must pass clean");
        assert_relative_eq!(dynamics.gain_reduction_db(1), 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_above_threshold_is_reduced() {
        let mut dynamics = Dynamics::new(3, 48000, 2);
        // 0 dBFS signal, -20 dB threshold, 4:1 ratio
        let mut block = loud_block(1.0, 9600);
        dynamics.process_band(0, &mut block, &band_params(-20.0, 4.0));

        // 20 dB over threshold at 4:1 leaves 5 dB over: 15 dB of reduction
        let tail = *block.last().unwrap();
        assert_relative_eq!(linear_to_db(tail), -15.0, epsilon = 0.5);
        assert_relative_eq!(dynamics.gain_reduction_db(0), -15.0, epsilon = 0.5);
    }

    #[test]
    fn test_gain_reduction_stays_in_unit_range() {
        let mut dynamics = Dynamics::new(2, 48000, 1);
        let mut block = vec![4.0; 9600];
        dynamics.process_band(0, &mut block, &band_params(-60.0, 20.0));

        for (band, state) in dynamics.bands.iter().enumerate() {
            assert!(
                (0.0..=1.0).contains(&state.gain_reduction),
                "band {} gain reduction {}",
                band,
                state.gain_reduction
            );
        }
    }

    #[test]
    fn test_bypass_sentinel_is_bit_exact() {
        let mut dynamics = Dynamics::new(3, 48000, 2);
        let mut block = loud_block(1.0, 4800);
        let original = block.clone();

        dynamics.process_band(1, &mut block, &band_params(-20.0, BYPASS_RATIO));

        assert_eq!(block, original);
        assert_relative_eq!(dynamics.gain_reduction_db(1), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_release_recovers_after_burst() {
        let mut dynamics = Dynamics::new(1, 48000, 1);
        let params = band_params(-20.0, 4.0);

        let mut burst = vec![1.0; 9600];
        dynamics.process_band(0, &mut burst, &params);
        let during = dynamics.gain_reduction_db(0);
        assert!(during < -10.0, "expected deep reduction, got {}", during);

        // Quiet passage long enough for the 50 ms release to recover
        let mut quiet = vec![0.001; 48000];
        dynamics.process_band(0, &mut quiet, &params);
        let after = dynamics.gain_reduction_db(0);
        assert!(after > -0.5, "expected recovery, got {}", after);
    }

    #[test]
    fn test_linked_channels_reduced_equally() {
        let mut dynamics = Dynamics::new(1, 48000, 2);
        // Loud left, quiet right
        let mut block: Vec<f32> = (0..4800).flat_map(|_| [1.0, 0.1]).collect();
        dynamics.process_band(0, &mut block, &band_params(-20.0, 4.0));

        // Ratio between channels must survive linked compression
        let left = block[block.len() - 2];
        let right = block[block.len() - 1];
        assert_relative_eq!(right / left, 0.1, epsilon = 0.01);
        assert!(right < 0.1, "quiet channel follows the loud one down");
    }

    #[test]
    fn test_reconfigure_resets_state() {
        let mut dynamics = Dynamics::new(2, 48000, 1);
        let mut block = vec![1.0; 4800];
        dynamics.process_band(0, &mut block, &band_params(-20.0, 4.0));
        assert!(dynamics.gain_reduction_db(0) < -1.0);

        dynamics.reconfigure(4);
        assert_eq!(dynamics.num_bands(), 4);
        assert_relative_eq!(dynamics.gain_reduction_db(0), 0.0, epsilon = 1e-6);
    }
}
