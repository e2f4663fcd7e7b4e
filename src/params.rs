//! Tunable engine parameters
//!
//! Every control has a declared valid range. Updates are validated before
//! they are published; a rejected update leaves the prior snapshot in
//! effect. Snapshots are immutable and versioned so the audio thread can
//! read them without coordination.

use crate::error::{CrescendoError, Result};
use crate::frame::db_to_linear;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum number of frequency bands
pub const MIN_BANDS: usize = 2;
/// Maximum number of frequency bands
pub const MAX_BANDS: usize = 6;

/// Ratio sentinel that disables a band's compression deterministically
///
/// 1.0 is also the bottom of the valid ratio range; a 1:1 compressor is a
/// no-op, so the sentinel doubles as a legal value.
pub const BYPASS_RATIO: f32 = 1.0;

/// Per-band compressor and gain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandParams {
    /// Band gain in dB (-24 to +24)
    pub gain_db: f32,
    /// Compressor threshold in dB (-60 to 0)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0; 1.0 bypasses the band's compressor)
    pub ratio: f32,
    /// Attack time in milliseconds (0.1 to 100)
    pub attack_ms: f32,
    /// Release time in milliseconds (10 to 1000)
    pub release_ms: f32,
}

impl Default for BandParams {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            threshold_db: -18.0,
            ratio: 2.0,
            attack_ms: 10.0,
            release_ms: 100.0,
        }
    }
}

impl BandParams {
    /// Validate parameters against their declared ranges
    pub fn validate(&self) -> Result<()> {
        range_check("gain_db", self.gain_db, -24.0, 24.0, "-24 to +24 dB")?;
        range_check(
            "threshold_db",
            self.threshold_db,
            -60.0,
            0.0,
            "-60 to 0 dB",
        )?;
        range_check("ratio", self.ratio, 1.0, 20.0, "1.0 to 20.0")?;
        range_check("attack_ms", self.attack_ms, 0.1, 100.0, "0.1 to 100 ms")?;
        range_check(
            "release_ms",
            self.release_ms,
            10.0,
            1000.0,
            "10 to 1000 ms",
        )?;
        Ok(())
    }

    /// Clamp all parameters to their valid ranges
    pub fn clamp(&mut self) {
        self.gain_db = self.gain_db.clamp(-24.0, 24.0);
        self.threshold_db = self.threshold_db.clamp(-60.0, 0.0);
        self.ratio = self.ratio.clamp(1.0, 20.0);
        self.attack_ms = self.attack_ms.clamp(0.1, 100.0);
        self.release_ms = self.release_ms.clamp(10.0, 1000.0);
    }

    /// Whether this band's compressor is disabled by the ratio sentinel
    pub fn compressor_bypassed(&self) -> bool {
        self.ratio <= BYPASS_RATIO
    }

    /// Band gain as a linear factor
    pub fn gain_linear(&self) -> f32 {
        db_to_linear(self.gain_db)
    }
}

/// Complete engine parameter set
///
/// A published `Parameters` value is an immutable snapshot; the control
/// interface builds a new one for every accepted update and bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Snapshot version, incremented on each publish
    pub version: u64,
    /// When false the engine passes raw input to output unchanged
    pub enabled: bool,
    /// Per-band settings, one entry per frequency band (low to high)
    pub bands: Vec<BandParams>,
    /// Makeup gain applied after recombination, in dB (0 to 24)
    pub makeup_gain_db: f32,
    /// Output ceiling in dB (-12 to 0); no sample ever exceeds it
    pub ceiling_db: f32,
}

impl Parameters {
    /// Default parameter set for the given band count
    pub fn defaults(num_bands: usize) -> Self {
        Self {
            version: 0,
            enabled: true,
            bands: vec![BandParams::default(); num_bands],
            makeup_gain_db: 0.0,
            ceiling_db: -1.0,
        }
    }

    /// Validate the full parameter set
    pub fn validate(&self) -> Result<()> {
        if self.bands.len() < MIN_BANDS || self.bands.len() > MAX_BANDS {
            return Err(CrescendoError::InvalidParameter {
                param: "bands".to_string(),
                value: self.bands.len().to_string(),
                expected: format!("{} to {} bands", MIN_BANDS, MAX_BANDS),
            });
        }
        for band in &self.bands {
            band.validate()?;
        }
        range_check(
            "makeup_gain_db",
            self.makeup_gain_db,
            0.0,
            24.0,
            "0 to 24 dB",
        )?;
        range_check("ceiling_db", self.ceiling_db, -12.0, 0.0, "-12 to 0 dB")?;
        Ok(())
    }

    /// Set a single control by name
    ///
    /// Names are `makeup_gain_db`, `ceiling_db`, `enabled`, or a band
    /// control of the form `band<N>.<field>` with 1-based band numbers,
    /// e.g. `band1.gain_db` or `band2.ratio`. The value is validated; on
    /// error `self` is left untouched.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "enabled" => {
                self.enabled = expect_bool(name, value)?;
                return Ok(());
            }
            "makeup_gain_db" => {
                let v = expect_number(name, value)?;
                range_check("makeup_gain_db", v, 0.0, 24.0, "0 to 24 dB")?;
                self.makeup_gain_db = v;
                return Ok(());
            }
            "ceiling_db" => {
                let v = expect_number(name, value)?;
                range_check("ceiling_db", v, -12.0, 0.0, "-12 to 0 dB")?;
                self.ceiling_db = v;
                return Ok(());
            }
            _ => {}
        }

        let (band_index, field) = parse_band_control(name, self.bands.len())?;
        let v = expect_number(name, value)?;
        let mut band = self.bands[band_index].clone();
        match field {
            "gain_db" => band.gain_db = v,
            "threshold_db" => band.threshold_db = v,
            "ratio" => band.ratio = v,
            "attack_ms" => band.attack_ms = v,
            "release_ms" => band.release_ms = v,
            _ => {
                return Err(CrescendoError::UnknownParameter {
                    name: name.to_string(),
                })
            }
        }
        band.validate()?;
        self.bands[band_index] = band;
        Ok(())
    }

    /// Serialize the snapshot to a JSON value
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Build a parameter set from a JSON value, validating ranges
    pub fn from_json(json: &Value) -> Result<Self> {
        let params: Parameters = serde_json::from_value(json.clone())?;
        params.validate()?;
        Ok(params)
    }
}

/// Parse `band<N>.<field>` into a 0-based band index and field name
fn parse_band_control(name: &str, num_bands: usize) -> Result<(usize, &str)> {
    let unknown = || CrescendoError::UnknownParameter {
        name: name.to_string(),
    };

    let (band_part, field) = name.split_once('.').ok_or_else(unknown)?;
    let number = band_part.strip_prefix("band").ok_or_else(unknown)?;
    let index: usize = number.parse().map_err(|_| unknown())?;

    if index < 1 || index > num_bands {
        return Err(CrescendoError::InvalidParameter {
            param: name.to_string(),
            value: index.to_string(),
            expected: format!("band number 1 to {}", num_bands),
        });
    }
    Ok((index - 1, field))
}

fn expect_number(name: &str, value: &Value) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| CrescendoError::InvalidParameter {
            param: name.to_string(),
            value: value.to_string(),
            expected: "a number".to_string(),
        })
}

fn expect_bool(name: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| CrescendoError::InvalidParameter {
            param: name.to_string(),
            value: value.to_string(),
            expected: "a boolean".to_string(),
        })
}

fn range_check(param: &str, value: f32, min: f32, max: f32, expected: &str) -> Result<()> {
    if value < min || value > max || !value.is_finite() {
        return Err(CrescendoError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        for bands in MIN_BANDS..=MAX_BANDS {
            let params = Parameters::defaults(bands);
            assert!(params.validate().is_ok(), "{} bands", bands);
        }
    }

    #[test_case("band1.gain_db", json!(6.0); "band gain")]
    #[test_case("band2.threshold_db", json!(-24.0); "band threshold")]
    #[test_case("band3.ratio", json!(4.0); "band ratio")]
    #[test_case("band1.attack_ms", json!(5.0); "band attack")]
    #[test_case("band2.release_ms", json!(250.0); "band release")]
    #[test_case("makeup_gain_db", json!(3.0); "makeup gain")]
    #[test_case("ceiling_db", json!(-0.5); "ceiling")]
    fn test_set_accepts_in_range(name: &str, value: Value) {
        let mut params = Parameters::defaults(3);
        assert!(params.set(name, &value).is_ok());
    }

    #[test_case("band1.gain_db", json!(30.0); "gain too high")]
    #[test_case("band1.threshold_db", json!(5.0); "threshold above zero")]
    #[test_case("band1.ratio", json!(0.5); "ratio below unity")]
    #[test_case("band1.attack_ms", json!(0.0); "attack too fast")]
    #[test_case("makeup_gain_db", json!(-1.0); "negative makeup")]
    #[test_case("ceiling_db", json!(1.0); "ceiling above zero")]
    fn test_set_rejects_out_of_range(name: &str, value: Value) {
        let mut params = Parameters::defaults(3);
        let before = params.clone();
        assert!(params.set(name, &value).is_err());
        // Rejected update must leave the prior values intact
        assert_eq!(params, before);
    }

    #[test]
    fn test_set_unknown_parameter() {
        let mut params = Parameters::defaults(3);
        let err = params.set("band1.wibble", &json!(1.0)).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");

        let err = params.set("no_such_control", &json!(1.0)).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");
    }

    #[test]
    fn test_set_band_out_of_bounds() {
        let mut params = Parameters::defaults(2);
        let err = params.set("band3.gain_db", &json!(0.0)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        let err = params.set("band0.gain_db", &json!(0.0)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_set_rejects_wrong_value_type() {
        let mut params = Parameters::defaults(3);
        assert!(params.set("band1.gain_db", &json!("loud")).is_err());
        assert!(params.set("enabled", &json!(1.0)).is_err());
    }

    #[test]
    fn test_bypass_sentinel() {
        let mut band = BandParams::default();
        band.ratio = BYPASS_RATIO;
        assert!(band.compressor_bypassed());
        band.ratio = 1.5;
        assert!(!band.compressor_bypassed());
    }

    #[test]
    fn test_clamp() {
        let mut band = BandParams {
            gain_db: 100.0,
            threshold_db: -100.0,
            ratio: 50.0,
            attack_ms: 0.001,
            release_ms: 5000.0,
        };
        band.clamp();
        assert_eq!(band.gain_db, 24.0);
        assert_eq!(band.threshold_db, -60.0);
        assert_eq!(band.ratio, 20.0);
        assert_eq!(band.attack_ms, 0.1);
        assert_eq!(band.release_ms, 1000.0);
        assert!(band.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let mut params = Parameters::defaults(3);
        params.set("band1.gain_db", &json!(6.0)).unwrap();
        params.set("ceiling_db", &json!(-2.0)).unwrap();

        let json = params.to_json().unwrap();
        let restored = Parameters::from_json(&json).unwrap();
        assert_eq!(restored, params);
    }

    #[test]
    fn test_from_json_validates() {
        let mut params = Parameters::defaults(3);
        params.bands[0].ratio = 99.0; // bypass validation by poking the field
        let json = params.to_json().unwrap();
        assert!(Parameters::from_json(&json).is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let mut params = Parameters::defaults(3);
        assert!(params.set("band1.gain_db", &json!(f64::NAN)).is_err());
    }
}
