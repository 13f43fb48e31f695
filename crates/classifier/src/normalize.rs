//! Per-channel affine normalization

use crate::NormalizationConfig;

/// Per-channel `out = in * alpha + beta` coefficients, BGR order.
///
/// `alpha_c = input_scale * scale_c` and `beta_c = -mean_c * alpha_c`, so the
/// quantization scale of int8 models is folded into the transform. Models
/// with an asymmetric input quantization also add their zero point to `beta_c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    pub alpha: [f32; 3],
    pub beta: [f32; 3],
}

impl NormalizationParams {
    /// Derive coefficients for a model with the given input scale
    pub fn new(input_scale: f32, constants: &NormalizationConfig) -> Self {
        let mut alpha = [0.0; 3];
        let mut beta = [0.0; 3];
        for c in 0..3 {
            alpha[c] = input_scale * constants.scale[c];
            beta[c] = -constants.mean[c] * alpha[c];
        }
        Self { alpha, beta }
    }

    /// Shift the output by a quantization zero point
    pub fn with_zero_point(mut self, zero_point: i32) -> Self {
        for beta in self.beta.iter_mut() {
            *beta += zero_point as f32;
        }
        self
    }

    /// Transform one raw pixel value of channel `c`
    #[inline]
    pub fn apply(&self, c: usize, pixel: u8) -> f32 {
        pixel as f32 * self.alpha[c] + self.beta[c]
    }

    /// Transform and round to the nearest signed 8-bit value, saturating
    #[inline]
    pub fn apply_i8(&self, c: usize, pixel: u8) -> i8 {
        self.apply(c, pixel).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_float_coefficients() {
        let params = NormalizationParams::new(1.0, &NormalizationConfig::default());
        assert_eq!(params.alpha, [0.017; 3]);
        assert!((params.beta[0] - (-103.94 * 0.017)).abs() < 1e-6);
        assert!((params.beta[2] - (-123.68 * 0.017)).abs() < 1e-6);
        // Channel mean maps to zero
        assert!(params.apply(1, 117).abs() < 0.01);
    }

    #[test]
    fn test_input_scale_folds_into_both_terms() {
        let constants = NormalizationConfig::default();
        let params = NormalizationParams::new(2.0, &constants);
        for c in 0..3 {
            assert_eq!(params.alpha[c], 2.0 * constants.scale[c]);
            assert_eq!(params.beta[c], -constants.mean[c] * (2.0 * constants.scale[c]));
        }
    }

    #[test]
    fn test_zero_point_shifts_offset() {
        let constants = NormalizationConfig::default();
        let symmetric = NormalizationParams::new(4.0, &constants);
        let shifted = symmetric.with_zero_point(-5);
        assert_eq!(shifted.alpha, symmetric.alpha);
        for c in 0..3 {
            assert_eq!(shifted.beta[c], symmetric.beta[c] - 5.0);
        }
        assert_eq!(symmetric.with_zero_point(0), symmetric);
    }

    #[test]
    fn test_i8_saturates() {
        let constants = NormalizationConfig {
            mean: [0.0; 3],
            scale: [1.0; 3],
        };
        let params = NormalizationParams::new(1.0, &constants);
        assert_eq!(params.apply_i8(0, 255), 127);
        assert_eq!(params.apply_i8(0, 100), 100);

        let shifted = NormalizationParams::new(
            1.0,
            &NormalizationConfig {
                mean: [255.0; 3],
                scale: [1.0; 3],
            },
        );
        assert_eq!(shifted.apply_i8(2, 0), -128);
    }

    #[test]
    fn test_i8_rounds_to_nearest() {
        let params = NormalizationParams {
            alpha: [0.5; 3],
            beta: [0.0; 3],
        };
        assert_eq!(params.apply_i8(0, 3), 2); // 1.5 rounds away from zero
        assert_eq!(params.apply_i8(0, 2), 1);
    }

    proptest! {
        #[test]
        fn prop_apply_is_exact_affine(
            pixel in any::<u8>(),
            c in 0usize..3,
            alpha in -4.0f32..4.0,
            beta in -300.0f32..300.0,
        ) {
            let params = NormalizationParams { alpha: [alpha; 3], beta: [beta; 3] };
            let first = params.apply(c, pixel);
            prop_assert_eq!(first, pixel as f32 * alpha + beta);
            prop_assert_eq!(first, params.apply(c, pixel));
        }
    }
}
