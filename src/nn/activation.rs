//! Activation layers

use crate::tensor::Tensor;
use ndarray::Array1;

/// Rectified linear unit
pub struct Relu {
    // Mask of positive inputs from the last training forward
    cached_mask: Option<Vec<bool>>,
    training: bool,
}

impl Relu {
    pub fn new() -> Self {
        Self {
            cached_mask: None,
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        if self.training {
            self.cached_mask = Some(x.data().iter().map(|&v| v > 0.0).collect());
        }
        let out: Vec<f32> = x.data().iter().map(|&v| v.max(0.0)).collect();
        Tensor::from_shape_vec(x.shape().to_vec(), out, false)
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let mask = self
            .cached_mask
            .as_ref()
            .expect("backward called without a cached forward input");
        Array1::from_iter(
            grad_out
                .iter()
                .zip(mask.iter())
                .map(|(&g, &on)| if on { g } else { 0.0 }),
        )
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_mask = None;
        }
    }
}

impl Default for Relu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_forward_clamps_negatives() {
        let mut relu = Relu::new();
        let y = relu.forward(&Tensor::from_vec(vec![-1.0, 0.0, 2.0], false));
        assert_eq!(y.data().to_vec(), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_backward_masks_gradient() {
        let mut relu = Relu::new();
        let _ = relu.forward(&Tensor::from_vec(vec![-1.0, 3.0], false));
        let gx = relu.backward(&Array1::from(vec![5.0, 5.0]));
        assert_abs_diff_eq!(gx[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(gx[1], 5.0, epsilon = 1e-7);
    }
}
