//! # Fixed point conversion
//!
//! The accelerators compute on signed 16 bit fixed point values. A float `x`
//! with exponent `s` is stored as `floor(x * 2^s)` and read back as
//! `v / 2^s`. The exponents are per model and fixed for the lifetime of the
//! process (see [`ModelConfig`](crate::config::ModelConfig)).
//!
//! Narrowing to `i16` can overflow; what happens then is chosen explicitly
//! through [`OverflowPolicy`].

use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::config::ModelConfig;
use crate::error::{DispatchError, Result};
use crate::tensor::{FixedPointBuffer, OutputBlock, PaddedBatch};

/// What to do with a value whose scaled form does not fit in `i16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the whole buffer with [`DispatchError::Range`]
    #[default]
    Fail,

    /// Clamp to `i16::MIN..=i16::MAX` and log how many values were clamped
    Saturate,
}

#[inline]
fn scaled(value: f32, exponent: i32) -> f64 {
    (f64::from(value) * 2f64.powi(exponent)).floor()
}

/// Converts one float to fixed point, failing on overflow or NaN.
pub fn to_fixed(value: f32, exponent: i32) -> Result<i16> {
    let scaled = scaled(value, exponent);
    if scaled.is_nan() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
        return Err(DispatchError::Range { value, exponent });
    }
    Ok(scaled as i16)
}

/// Converts one float to fixed point, clamping out-of-range values.
///
/// Returns the clamped value and whether clamping happened. NaN is still an
/// error, there is no meaningful value to clamp it to.
pub fn to_fixed_saturating(value: f32, exponent: i32) -> Result<(i16, bool)> {
    let scaled = scaled(value, exponent);
    if scaled.is_nan() {
        return Err(DispatchError::Range { value, exponent });
    }
    let clamped = scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX));
    Ok((clamped as i16, clamped != scaled))
}

/// Converts one fixed point value back to float.
#[inline]
pub fn to_float(value: i16, exponent: i32) -> f32 {
    (f64::from(value) / 2f64.powi(exponent)) as f32
}

/// # QuantizationCodec
///
/// Converts whole batches at the dispatch boundary, using the model's input
/// exponent on the way in and its output exponent on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationCodec {
    input_exponent: i32,
    output_exponent: i32,
    policy: OverflowPolicy,
}

impl QuantizationCodec {
    pub fn new(input_exponent: i32, output_exponent: i32, policy: OverflowPolicy) -> Self {
        Self { input_exponent, output_exponent, policy }
    }

    pub fn from_model(model: &ModelConfig, policy: OverflowPolicy) -> Self {
        Self::new(model.input_exponent, model.output_exponent, policy)
    }

    pub fn input_exponent(&self) -> i32 {
        self.input_exponent
    }

    pub fn output_exponent(&self) -> i32 {
        self.output_exponent
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Quantizes a padded batch into the hardware input buffer.
    pub fn quantize(&self, batch: &PaddedBatch) -> Result<FixedPointBuffer> {
        let exponent = self.input_exponent;
        let data = match self.policy {
            OverflowPolicy::Fail => batch.as_slice()
                .iter()
                .map(|&value| to_fixed(value, exponent))
                .collect::<Result<Vec<_>>>()?,
            OverflowPolicy::Saturate => {
                let mut clamped = 0usize;
                let data = batch.as_slice()
                    .iter()
                    .map(|&value| {
                        let (fixed, was_clamped) = to_fixed_saturating(value, exponent)?;
                        clamped += usize::from(was_clamped);
                        Ok(fixed)
                    })
                    .collect::<Result<Vec<_>>>()?;
                if clamped > 0 {
                    warn!(clamped, exponent, "saturated values outside the fixed point range");
                }
                data
            }
        };
        FixedPointBuffer::from_vec(batch.batch(), batch.frames(), batch.width(), data)
    }

    /// Converts a hardware output block back to floats, same layout.
    pub fn dequantize(&self, block: &OutputBlock) -> Vec<f32> {
        block.as_slice()
            .iter()
            .map(|&value| to_float(value, self.output_exponent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_fixed_floors() {
        assert_eq!(to_fixed(1.3, 2).unwrap(), 5);
        assert_eq!(to_fixed(-1.3, 2).unwrap(), -6);
        assert_eq!(to_fixed(0.0, 10).unwrap(), 0);
    }

    #[test]
    fn test_to_fixed_edges_of_range() {
        assert_eq!(to_fixed(32767.0, 0).unwrap(), i16::MAX);
        assert_eq!(to_fixed(-32768.0, 0).unwrap(), i16::MIN);
        assert!(matches!(
            to_fixed(32768.0, 0),
            Err(DispatchError::Range { exponent: 0, .. })
        ));
        assert!(to_fixed(-4.0, 13).is_ok());
        assert!(to_fixed(-4.01, 13).is_err());
    }

    #[test]
    fn test_to_fixed_rejects_nan() {
        assert!(to_fixed(f32::NAN, 3).is_err());
        assert!(to_fixed_saturating(f32::NAN, 3).is_err());
    }

    #[test]
    fn test_saturating_clamps() {
        assert_eq!(to_fixed_saturating(1e9, 4).unwrap(), (i16::MAX, true));
        assert_eq!(to_fixed_saturating(-1e9, 4).unwrap(), (i16::MIN, true));
        assert_eq!(to_fixed_saturating(0.5, 4).unwrap(), (8, false));
    }

    #[test]
    fn test_to_float_divides() {
        assert_eq!(to_float(8, 4), 0.5);
        assert_eq!(to_float(-3, 1), -1.5);
        assert_eq!(to_float(3, -2), 12.0);
    }

    #[test]
    fn test_quantize_fail_policy_rejects_batch() {
        let codec = QuantizationCodec::new(8, 8, OverflowPolicy::Fail);
        let batch = PaddedBatch::new(1, 1, 2, vec![1], vec![0.5, 500.0]).unwrap();
        assert!(matches!(codec.quantize(&batch), Err(DispatchError::Range { .. })));
    }

    #[test]
    fn test_quantize_saturate_policy_keeps_shape() {
        let codec = QuantizationCodec::new(8, 8, OverflowPolicy::Saturate);
        let batch = PaddedBatch::new(1, 1, 2, vec![1], vec![0.5, 500.0]).unwrap();
        let fixed = codec.quantize(&batch).unwrap();
        assert_eq!(fixed.shape(), [1, 1, 2]);
        assert_eq!(fixed.as_slice(), &[128, i16::MAX]);
    }

    #[test]
    fn test_dequantize_uses_output_exponent() {
        let codec = QuantizationCodec::new(0, 2, OverflowPolicy::Fail);
        let block = OutputBlock::from_vec(1, 1, 3, vec![4, -2, 1]).unwrap();
        assert_eq!(codec.dequantize(&block), vec![1.0, -0.5, 0.25]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: a round trip lands within one quantization step below x
        #[test]
        fn prop_round_trip_within_one_step(
            exponent in 0i32..=12,
            fraction in -1.0f64..1.0,
        ) {
            let limit = f64::from(i16::MAX) / 2f64.powi(exponent);
            let x = (fraction * limit) as f32;
            let back = to_float(to_fixed(x, exponent).unwrap(), exponent);
            let step = 2f32.powi(-exponent);
            prop_assert!(back <= x);
            prop_assert!(x - back < step);
        }
    }
}
