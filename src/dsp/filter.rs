//! Crossover filter bank
//!
//! Splits the input into N frequency bands using cascaded biquad stages.
//! Each band boundary is a 4th-order Linkwitz-Riley crossover (two cascaded
//! 2nd-order Butterworth sections), so adjacent bands sum back to a flat
//! response. Filtering is deterministic given state and input.
//!
//! Layout changes are never applied mid-block: the engine queues a new
//! `CrossoverLayout` and calls [`Crossover::reconfigure`] at a block
//! boundary, which rebuilds the stages and resets filter history.

use crate::error::{CrescendoError, Result};
use crate::params::{MAX_BANDS, MIN_BANDS};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Biquad filter coefficients
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Butterworth low-pass section (Audio EQ Cookbook)
    fn low_pass(sample_rate: f64, frequency: f64) -> Self {
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * FRAC_1_SQRT_2);

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Butterworth high-pass section (Audio EQ Cookbook)
    fn high_pass(sample_rate: f64, frequency: f64) -> Self {
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * FRAC_1_SQRT_2);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad history registers for one channel
///
/// Direct Form I: keeps the last two inputs and outputs.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One cascaded filter stage: coefficients plus per-channel state
#[derive(Debug, Clone)]
struct Stage {
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl Stage {
    fn new(coeffs: BiquadCoeffs, num_channels: usize) -> Self {
        Self {
            coeffs,
            states: vec![BiquadState::default(); num_channels],
        }
    }

    /// Filter one interleaved block in place
    fn process(&mut self, samples: &mut [f32]) {
        let num_channels = self.states.len();
        for (i, sample) in samples.iter_mut().enumerate() {
            let ch = i % num_channels;
            *sample = self.states[ch].process(*sample as f64, &self.coeffs) as f32;
        }
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}

/// Band layout: crossover frequencies between adjacent bands
///
/// N crossover points define N+1 bands, low to high.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverLayout {
    crossovers_hz: Vec<f32>,
}

impl CrossoverLayout {
    /// Build a layout from ascending crossover frequencies
    pub fn new(crossovers_hz: Vec<f32>, sample_rate: u32) -> Result<Self> {
        let num_bands = crossovers_hz.len() + 1;
        if !(MIN_BANDS..=MAX_BANDS).contains(&num_bands) {
            return Err(CrescendoError::ConfigurationConflict {
                reason: format!(
                    "{} crossover points give {} bands (supported: {} to {})",
                    crossovers_hz.len(),
                    num_bands,
                    MIN_BANDS,
                    MAX_BANDS
                ),
            });
        }

        let nyquist = sample_rate as f32 / 2.0;
        for pair in crossovers_hz.windows(2) {
            if pair[0] >= pair[1] {
                return Err(CrescendoError::ConfigurationConflict {
                    reason: format!(
                        "crossover frequencies must be strictly ascending ({} then {})",
                        pair[0], pair[1]
                    ),
                });
            }
        }
        for &freq in &crossovers_hz {
            if freq < 20.0 || freq >= nyquist {
                return Err(CrescendoError::ConfigurationConflict {
                    reason: format!(
                        "crossover frequency {} Hz outside 20 Hz to Nyquist ({} Hz)",
                        freq, nyquist
                    ),
                });
            }
        }

        Ok(Self { crossovers_hz })
    }

    /// Default finishing-chain layout: three bands split at 200 Hz and 2 kHz
    ///
    /// Valid at every supported sample rate (2 kHz is below the 8 kHz
    /// Nyquist floor), so this cannot fail.
    pub fn default_three_band() -> Self {
        Self {
            crossovers_hz: vec![200.0, 2000.0],
        }
    }

    /// Number of bands this layout produces
    pub fn num_bands(&self) -> usize {
        self.crossovers_hz.len() + 1
    }

    /// Crossover frequencies in Hz, ascending
    pub fn crossovers_hz(&self) -> &[f32] {
        &self.crossovers_hz
    }

    /// Geometric center frequency of a band, used by tests and metering
    pub fn band_center_hz(&self, band: usize, sample_rate: u32) -> f32 {
        let lo = if band == 0 {
            20.0
        } else {
            self.crossovers_hz[band - 1]
        };
        let hi = if band == self.crossovers_hz.len() {
            sample_rate as f32 / 2.0
        } else {
            self.crossovers_hz[band]
        };
        (lo * hi).sqrt()
    }
}

/// Per-band filter chains for one crossover split
#[derive(Debug, Clone)]
struct BandChain {
    stages: Vec<Stage>,
}

/// N-band crossover filter bank
pub struct Crossover {
    layout: CrossoverLayout,
    sample_rate: u32,
    num_channels: usize,
    bands: Vec<BandChain>,
}

impl Crossover {
    pub fn new(layout: CrossoverLayout, sample_rate: u32, num_channels: usize) -> Self {
        let bands = build_chains(&layout, sample_rate, num_channels);
        Self {
            layout,
            sample_rate,
            num_channels,
            bands,
        }
    }

    /// Current band layout
    pub fn layout(&self) -> &CrossoverLayout {
        &self.layout
    }

    /// Number of bands
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Replace the band layout, rebuilding stages and resetting history
    ///
    /// Callers must only invoke this at a block boundary.
    pub fn reconfigure(&mut self, layout: CrossoverLayout) {
        self.bands = build_chains(&layout, self.sample_rate, self.num_channels);
        self.layout = layout;
    }

    /// Reset all filter history without changing the layout
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            for stage in &mut band.stages {
                stage.reset();
            }
        }
    }

    /// Split one interleaved block into per-band copies
    ///
    /// `bands_out` must contain exactly `num_bands()` buffers; each is
    /// resized to the input length and overwritten.
    pub fn split(&mut self, input: &[f32], bands_out: &mut [Vec<f32>]) {
        debug_assert_eq!(bands_out.len(), self.bands.len());

        for (chain, out) in self.bands.iter_mut().zip(bands_out.iter_mut()) {
            out.clear();
            out.extend_from_slice(input);
            for stage in &mut chain.stages {
                stage.process(out);
            }
        }
    }
}

/// Build the cascaded stages for every band of a layout
///
/// Band i is the input low-passed at crossover i (except the top band) and
/// high-passed at crossover i-1 (except the bottom band); each crossover
/// contributes two identical Butterworth sections (Linkwitz-Riley 4th order).
fn build_chains(
    layout: &CrossoverLayout,
    sample_rate: u32,
    num_channels: usize,
) -> Vec<BandChain> {
    let crossovers = layout.crossovers_hz();
    let num_bands = layout.num_bands();
    let mut bands = Vec::with_capacity(num_bands);

    for band in 0..num_bands {
        let mut stages = Vec::new();
        if band > 0 {
            let coeffs = BiquadCoeffs::high_pass(sample_rate as f64, crossovers[band - 1] as f64);
            stages.push(Stage::new(coeffs, num_channels));
            stages.push(Stage::new(coeffs, num_channels));
        }
        if band < num_bands - 1 {
            let coeffs = BiquadCoeffs::low_pass(sample_rate as f64, crossovers[band] as f64);
            stages.push(Stage::new(coeffs, num_channels));
            stages.push(Stage::new(coeffs, num_channels));
        }
        bands.push(BandChain { stages });
    }

    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(frequency: f32, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    #[test]
    fn test_layout_validation() {
        assert!(CrossoverLayout::new(vec![200.0, 2000.0], 48000).is_ok());
        // Descending
        assert!(CrossoverLayout::new(vec![2000.0, 200.0], 48000).is_err());
        // Above Nyquist
        assert!(CrossoverLayout::new(vec![30000.0], 48000).is_err());
        // Too many bands
        assert!(
            CrossoverLayout::new(vec![100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0], 48000).is_err()
        );
        // Too few bands
        assert!(CrossoverLayout::new(vec![], 48000).is_err());
    }

    #[test]
    fn test_band_center() {
        let layout = CrossoverLayout::default_three_band();
        assert_eq!(layout.num_bands(), 3);
        let mid = layout.band_center_hz(1, 48000);
        assert_relative_eq!(mid, (200.0_f32 * 2000.0).sqrt(), epsilon = 0.1);
    }

    #[test]
    fn test_split_silence_yields_silence() {
        let layout = CrossoverLayout::default_three_band();
        let mut crossover = Crossover::new(layout, 48000, 2);

        let input = vec![0.0; 1024];
        let mut bands = vec![Vec::new(); 3];
        crossover.split(&input, &mut bands);

        for band in &bands {
            assert_eq!(band.len(), input.len());
            assert!(band.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_in_band_sine_passes_mostly_through_its_band() {
        let sample_rate = 48000;
        let layout = CrossoverLayout::default_three_band();
        let mut crossover = Crossover::new(layout, sample_rate, 1);

        // 632 Hz is the geometric center of the 200-2000 Hz band
        let input = sine(632.0, sample_rate, sample_rate as usize / 2);
        let mut bands = vec![Vec::new(); 3];
        crossover.split(&input, &mut bands);

        // Skip the settling transient when measuring
        let settled = input.len() / 2;
        let mid_peak = peak(&bands[1][settled..]);
        let low_peak = peak(&bands[0][settled..]);
        let high_peak = peak(&bands[2][settled..]);

        assert!(mid_peak > 0.9, "mid band peak {}", mid_peak);
        assert!(low_peak < 0.1, "low band leakage {}", low_peak);
        assert!(high_peak < 0.2, "high band leakage {}", high_peak);
    }

    #[test]
    fn test_band_sum_is_flat() {
        let sample_rate = 48000;
        let layout = CrossoverLayout::default_three_band();
        let mut crossover = Crossover::new(layout, sample_rate, 1);

        let input = sine(1000.0, sample_rate, sample_rate as usize / 2);
        let mut bands = vec![Vec::new(); 3];
        crossover.split(&input, &mut bands);

        let sum: Vec<f32> = (0..input.len())
            .map(|i| bands[0][i] + bands[1][i] + bands[2][i])
            .collect();

        let settled = input.len() / 2;
        let sum_peak = peak(&sum[settled..]);
        assert_relative_eq!(sum_peak, 1.0, epsilon = 0.1);
    }

    #[test]
    fn test_split_is_deterministic() {
        let sample_rate = 48000;
        let input = sine(440.0, sample_rate, 4096);

        let run = |crossover: &mut Crossover| {
            let mut bands = vec![Vec::new(); 3];
            crossover.split(&input, &mut bands);
            bands
        };

        let layout = CrossoverLayout::default_three_band();
        let mut a = Crossover::new(layout.clone(), sample_rate, 1);
        let mut b = Crossover::new(layout, sample_rate, 1);
        assert_eq!(run(&mut a), run(&mut b));

        // Reset restores the initial state transition exactly
        a.reset();
        let first = run(&mut a);
        a.reset();
        let second = run(&mut a);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconfigure_changes_band_count_and_resets() {
        let sample_rate = 48000;
        let mut crossover = Crossover::new(
            CrossoverLayout::default_three_band(),
            sample_rate,
            2,
        );
        assert_eq!(crossover.num_bands(), 3);

        let two_band = CrossoverLayout::new(vec![1000.0], sample_rate).unwrap();
        crossover.reconfigure(two_band);
        assert_eq!(crossover.num_bands(), 2);

        let input = sine(440.0, sample_rate, 512);
        let stereo: Vec<f32> = input.iter().flat_map(|&s| [s, s]).collect();
        let mut bands = vec![Vec::new(); 2];
        crossover.split(&stereo, &mut bands);
        assert_eq!(bands[0].len(), stereo.len());
    }
}
