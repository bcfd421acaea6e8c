//! Per-channel normalization
//!
//! Normalizes each channel of a `[c, h, w]` tensor to zero mean and unit
//! variance over its spatial extent, then applies a learned affine transform.
//! Normalization layers are kept in floating point when a model is quantized.

use crate::tensor::Tensor;
use ndarray::Array1;

struct NormCache {
    xhat: Vec<f32>,
    inv_std: Vec<f32>,
    h: usize,
    w: usize,
}

/// Channel-wise normalization with learned scale and shift
pub struct ChannelNorm {
    gamma: Tensor,
    beta: Tensor,
    channels: usize,
    eps: f32,
    cache: Option<NormCache>,
    training: bool,
}

impl ChannelNorm {
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: Tensor::ones(vec![channels], true),
            beta: Tensor::zeros(vec![channels], true),
            channels,
            eps: 1e-5,
            cache: None,
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let shape = x.shape();
        assert_eq!(shape.len(), 3, "expected [c, h, w] input, got {shape:?}");
        assert_eq!(shape[0], self.channels, "channel count mismatch");
        let (h, w) = (shape[1], shape[2]);
        let n = (h * w) as f32;
        let xs = x.as_slice();
        let gamma = self.gamma.as_slice();
        let beta = self.beta.as_slice();

        let mut xhat = vec![0.0f32; xs.len()];
        let mut inv_std = vec![0.0f32; self.channels];
        let mut out = vec![0.0f32; xs.len()];

        for c in 0..self.channels {
            let plane = &xs[c * h * w..(c + 1) * h * w];
            let mean = plane.iter().sum::<f32>() / n;
            let var = plane.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / n;
            let istd = 1.0 / (var + self.eps).sqrt();
            inv_std[c] = istd;
            for (i, &v) in plane.iter().enumerate() {
                let xh = (v - mean) * istd;
                xhat[c * h * w + i] = xh;
                out[c * h * w + i] = gamma[c] * xh + beta[c];
            }
        }

        if self.training {
            self.cache = Some(NormCache { xhat, inv_std, h, w });
        }
        Tensor::from_shape_vec(shape.to_vec(), out, false)
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let cache = self
            .cache
            .as_ref()
            .expect("backward called without a cached forward input");
        let (h, w) = (cache.h, cache.w);
        let n = (h * w) as f32;
        let gamma = self.gamma.as_slice();

        let mut g_gamma = vec![0.0f32; self.channels];
        let mut g_beta = vec![0.0f32; self.channels];
        let mut gx = vec![0.0f32; self.channels * h * w];

        for c in 0..self.channels {
            let base = c * h * w;
            let xhat = &cache.xhat[base..base + h * w];
            let istd = cache.inv_std[c];

            let mut sum_dxhat = 0.0f32;
            let mut sum_dxhat_xhat = 0.0f32;
            for i in 0..h * w {
                let dy = grad_out[base + i];
                g_gamma[c] += dy * xhat[i];
                g_beta[c] += dy;
                let dxhat = dy * gamma[c];
                sum_dxhat += dxhat;
                sum_dxhat_xhat += dxhat * xhat[i];
            }
            for i in 0..h * w {
                let dxhat = grad_out[base + i] * gamma[c];
                gx[base + i] =
                    istd / n * (n * dxhat - sum_dxhat - xhat[i] * sum_dxhat_xhat);
            }
        }

        self.gamma.accumulate_grad(&Array1::from(g_gamma));
        self.beta.accumulate_grad(&Array1::from(g_beta));
        Array1::from(gx)
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cache = None;
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn gamma(&self) -> &Tensor {
        &self.gamma
    }

    pub fn beta(&self) -> &Tensor {
        &self.beta
    }

    pub fn gamma_mut(&mut self) -> &mut Tensor {
        &mut self.gamma
    }

    pub fn beta_mut(&mut self) -> &mut Tensor {
        &mut self.beta
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }

    pub(crate) fn gamma_beta_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.gamma, &mut self.beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalizes_to_unit_stats() {
        let mut norm = ChannelNorm::new(1);
        let x = Tensor::from_shape_vec(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let y = norm.forward(&x);

        let mean: f32 = y.data().iter().sum::<f32>() / 4.0;
        let var: f32 = y.data().iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_affine_applied() {
        let mut norm = ChannelNorm::new(1);
        norm.gamma_mut().data_mut()[0] = 2.0;
        norm.beta_mut().data_mut()[0] = 1.0;

        let x = Tensor::from_shape_vec(vec![1, 1, 2], vec![-1.0, 1.0], false);
        let y = norm.forward(&x);
        // xhat = ±1 up to eps, so y ≈ 1 ± 2
        assert_abs_diff_eq!(y.data()[0], -1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(y.data()[1], 3.0, epsilon = 1e-2);
    }

    #[test]
    fn test_backward_gradient_sums_to_zero() {
        // The normalized output is mean-invariant, so input gradients
        // within a channel sum to zero
        let mut norm = ChannelNorm::new(1);
        let x = Tensor::from_shape_vec(vec![1, 2, 2], vec![0.5, -1.0, 2.0, 0.1], false);
        let _ = norm.forward(&x);
        let gx = norm.backward(&Array1::from(vec![1.0, -0.5, 0.3, 2.0]));
        assert_abs_diff_eq!(gx.iter().sum::<f32>(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_beta_grad_is_grad_sum() {
        let mut norm = ChannelNorm::new(1);
        let x = Tensor::from_shape_vec(vec![1, 1, 2], vec![1.0, 2.0], false);
        let _ = norm.forward(&x);
        let _ = norm.backward(&Array1::from(vec![0.25, 0.75]));
        let gb = norm.beta().grad().expect("beta grad");
        assert_abs_diff_eq!(gb[0], 1.0, epsilon = 1e-6);
    }
}
