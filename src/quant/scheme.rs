//! Uniform symmetric quantization scheme
//!
//! Post-training quantization simulated in floating point: values are mapped
//! to an integer grid (quantize → dequantize) so the network computes with
//! quantization noise while parameters stay `f32`. Gradients pass through the
//! rounding with the straight-through estimator.

use ndarray::Array1;

/// Bit-width settings for a quantized model
#[derive(Clone, Copy, Debug)]
pub struct QuantSpec {
    /// Weight bit-width
    pub weight_bits: usize,
    /// Activation bit-width
    pub act_bits: usize,
}

impl Default for QuantSpec {
    fn default() -> Self {
        Self {
            weight_bits: 8,
            act_bits: 8,
        }
    }
}

/// Symmetric uniform quantizer with max-abs calibration
///
/// For bit-width `b`: `qmax = 2^(b-1) - 1`, `qmin = -qmax`, and
/// `scale = max|x| / qmax`. Quantization rounds `x / scale` to the nearest
/// integer in `[qmin, qmax]` and multiplies back.
#[derive(Clone, Debug)]
pub struct UniformQuantizer {
    bits: usize,
    qmin: i32,
    qmax: i32,
    scale: f32,
    initialized: bool,
}

impl UniformQuantizer {
    pub fn new(bits: usize) -> Self {
        assert!(bits >= 2 && bits <= 16, "bit-width must be in [2, 16]");
        let qmax = (1i32 << (bits - 1)) - 1;
        Self {
            bits,
            qmin: -qmax,
            qmax,
            scale: 1.0,
            initialized: false,
        }
    }

    /// Set the scale from the data's max absolute value
    pub fn calibrate(&mut self, data: &[f32]) {
        let max_abs = data.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        self.scale = max_abs / self.qmax as f32;
        // Degenerate all-zero input still needs a usable scale
        if self.scale < 1e-10 {
            self.scale = 1e-10;
        }
        self.initialized = true;
    }

    /// Quantize → dequantize a single value
    pub fn apply(&self, x: f32) -> f32 {
        let q = (x / self.scale)
            .round()
            .clamp(self.qmin as f32, self.qmax as f32);
        q * self.scale
    }

    /// Quantize → dequantize a buffer
    pub fn apply_slice(&self, data: &[f32]) -> Vec<f32> {
        data.iter().map(|&x| self.apply(x)).collect()
    }

    /// Calibrate from the input if not yet initialized, then apply
    pub fn apply_with_calibration(&mut self, data: &[f32]) -> Vec<f32> {
        if !self.initialized {
            self.calibrate(data);
        }
        self.apply_slice(data)
    }

    /// Straight-through estimator: the rounding is treated as identity
    pub fn ste_backward(&self, grad_output: &Array1<f32>) -> Array1<f32> {
        grad_output.clone()
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of representable levels
    pub fn num_levels(&self) -> usize {
        (self.qmax - self.qmin + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_q8_range() {
        let q = UniformQuantizer::new(8);
        assert_eq!(q.qmin, -127);
        assert_eq!(q.qmax, 127);
        assert_eq!(q.num_levels(), 255);
    }

    #[test]
    fn test_calibration_scale() {
        let mut q = UniformQuantizer::new(8);
        q.calibrate(&[0.0, 1.0, -2.0, 1.5]);
        assert_abs_diff_eq!(q.scale(), 2.0 / 127.0, epsilon = 1e-7);
        assert!(q.is_initialized());
    }

    #[test]
    fn test_zero_stays_zero() {
        let mut q = UniformQuantizer::new(8);
        q.calibrate(&[-1.0, 1.0]);
        assert_abs_diff_eq!(q.apply(0.0), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_all_zero_input_has_usable_scale() {
        let mut q = UniformQuantizer::new(8);
        q.calibrate(&[0.0, 0.0]);
        assert!(q.scale() > 0.0);
        assert_abs_diff_eq!(q.apply(0.0), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_ste_backward_identity() {
        let q = UniformQuantizer::new(8);
        let grad = Array1::from(vec![1.0, -2.0, 3.0]);
        let back = q.ste_backward(&grad);
        for (a, b) in back.iter().zip(grad.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-7);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(200))]

        /// Quantized values sit on the integer grid defined by the scale
        #[test]
        fn prop_output_on_grid(
            values in prop::collection::vec(-5.0f32..5.0, 4..32),
            bits in 4usize..9,
        ) {
            let mut q = UniformQuantizer::new(bits);
            q.calibrate(&values);
            for out in q.apply_slice(&values) {
                let level = (out / q.scale()).round();
                prop_assert!((out - level * q.scale()).abs() < 1e-5);
            }
        }

        /// Output is bounded by the representable range
        #[test]
        fn prop_output_bounded(
            values in prop::collection::vec(-100.0f32..100.0, 4..32),
            bits in 4usize..9,
        ) {
            let mut q = UniformQuantizer::new(bits);
            q.calibrate(&values);
            let bound = q.qmax as f32 * q.scale();
            for out in q.apply_slice(&values) {
                prop_assert!(out.abs() <= bound + 1e-5);
            }
        }

        /// 8-bit round-trip error is bounded by half a step
        #[test]
        fn prop_error_bounded_by_half_step(
            values in prop::collection::vec(-1.0f32..1.0, 4..32),
        ) {
            let mut q = UniformQuantizer::new(8);
            q.calibrate(&values);
            for (&x, out) in values.iter().zip(q.apply_slice(&values)) {
                prop_assert!((x - out).abs() <= q.scale() * 0.5 + 1e-6);
            }
        }
    }
}
