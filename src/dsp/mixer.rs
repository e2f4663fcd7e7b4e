//! Mixer and output stage
//!
//! Recombines the processed bands with their band gains, applies makeup
//! gain, then soft-limits toward the output ceiling. The limiter is the
//! identity below the knee and saturates smoothly above it; a final clamp
//! guarantees no sample ever exceeds the ceiling.

use crate::frame::db_to_linear;
use crate::params::Parameters;

/// Fraction of the ceiling where the soft-limiter knee begins
const KNEE_START: f32 = 0.75;

/// Sum per-band blocks into `out`, applying band and makeup gain
///
/// All band buffers must share the same length; `out` is overwritten.
pub fn recombine(bands: &[Vec<f32>], params: &Parameters, out: &mut Vec<f32>) {
    let block_len = bands.first().map_or(0, |b| b.len());
    out.clear();
    out.resize(block_len, 0.0);

    let makeup = db_to_linear(params.makeup_gain_db);
    for (band, band_params) in bands.iter().zip(params.bands.iter()) {
        debug_assert_eq!(band.len(), block_len);
        let gain = band_params.gain_linear() * makeup;
        for (acc, &sample) in out.iter_mut().zip(band.iter()) {
            *acc += sample * gain;
        }
    }
}

/// Soft-limit a block in place so every sample stays within the ceiling
///
/// Below `KNEE_START * ceiling` samples pass unchanged; above it they are
/// mapped through a tanh curve that approaches the ceiling asymptotically.
/// The closing clamp covers rounding at the very top of the curve.
pub fn soft_limit(samples: &mut [f32], ceiling_db: f32) {
    let ceiling = db_to_linear(ceiling_db);
    let knee = ceiling * KNEE_START;
    let range = ceiling - knee;

    for sample in samples.iter_mut() {
        let magnitude = sample.abs();
        if magnitude > knee {
            let shaped = knee + range * ((magnitude - knee) / range).tanh();
            *sample = sample.signum() * shaped.min(ceiling);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use approx::assert_relative_eq;

    #[test]
    fn test_recombine_sums_bands() {
        let params = Parameters::defaults(3);
        let bands = vec![vec![0.1; 8], vec![0.2; 8], vec![0.3; 8]];
        let mut out = Vec::new();
        recombine(&bands, &params, &mut out);

        assert_eq!(out.len(), 8);
        for &sample in &out {
            assert_relative_eq!(sample, 0.6, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_recombine_applies_band_gain() {
        let mut params = Parameters::defaults(2);
        params.bands[0].gain_db = 6.0;
        let bands = vec![vec![0.1; 4], vec![0.0; 4]];
        let mut out = Vec::new();
        recombine(&bands, &params, &mut out);

        // +6 dB is a factor of ~2
        assert_relative_eq!(out[0], 0.1995, epsilon = 0.001);
    }

    #[test]
    fn test_recombine_applies_makeup_gain() {
        let mut params = Parameters::defaults(2);
        params.makeup_gain_db = 6.0;
        let bands = vec![vec![0.1; 4], vec![0.1; 4]];
        let mut out = Vec::new();
        recombine(&bands, &params, &mut out);

        assert_relative_eq!(out[0], 0.399, epsilon = 0.001);
    }

    #[test]
    fn test_soft_limit_identity_below_knee() {
        let mut samples = vec![0.1, -0.3, 0.5, -0.6];
        let original = samples.clone();
        soft_limit(&mut samples, -1.0);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_soft_limit_enforces_ceiling() {
        let ceiling_db = -1.0;
        let ceiling = db_to_linear(ceiling_db);

        let mut samples: Vec<f32> = vec![0.5, 0.9, 1.5, 4.0, -8.0, 100.0];
        soft_limit(&mut samples, ceiling_db);

        for &sample in &samples {
            assert!(
                sample.abs() <= ceiling,
                "sample {} exceeds ceiling {}",
                sample,
                ceiling
            );
        }
        // Sign is preserved
        assert!(samples[4] < 0.0);
    }

    #[test]
    fn test_soft_limit_is_monotonic() {
        let ceiling_db = -3.0;
        let mut previous = 0.0_f32;
        for i in 0..200 {
            let mut sample = [i as f32 * 0.05];
            soft_limit(&mut sample, ceiling_db);
            assert!(
                sample[0] >= previous,
                "limiter not monotonic at input {}",
                i as f32 * 0.05
            );
            previous = sample[0];
        }
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut samples = vec![0.0; 64];
        soft_limit(&mut samples, -1.0);
        assert!(samples.iter().all(|&s| s == 0.0));

        let params = Parameters::defaults(3);
        let bands = vec![vec![0.0; 64]; 3];
        let mut out = Vec::new();
        recombine(&bands, &params, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
