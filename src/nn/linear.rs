//! Fully-connected layer over flat feature vectors

use crate::tensor::Tensor;
use ndarray::Array1;

/// `y = W x + b` with `W: [d_out, d_in]`
pub struct Linear {
    weight: Tensor,
    bias: Tensor,
    d_in: usize,
    d_out: usize,
    cached_input: Option<Tensor>,
    training: bool,
}

impl Linear {
    pub fn new(d_in: usize, d_out: usize) -> Self {
        Self {
            weight: Tensor::zeros(vec![d_out, d_in], true),
            bias: Tensor::zeros(vec![d_out], true),
            d_in,
            d_out,
            cached_input: None,
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        assert_eq!(x.len(), self.d_in, "expected {} input features", self.d_in);
        if self.training {
            self.cached_input = Some(x.clone());
        }
        let w = self.weight.as_slice();
        let b = self.bias.as_slice();
        let xs = x.as_slice();
        let mut out = vec![0.0f32; self.d_out];
        for o in 0..self.d_out {
            let mut acc = b[o];
            for i in 0..self.d_in {
                acc += w[o * self.d_in + i] * xs[i];
            }
            out[o] = acc;
        }
        Tensor::from_vec(out, false)
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let xs = x.as_slice();
        let w = self.weight.as_slice();
        let mut gw = vec![0.0f32; self.d_out * self.d_in];
        let mut gx = vec![0.0f32; self.d_in];
        for o in 0..self.d_out {
            let g = grad_out[o];
            for i in 0..self.d_in {
                gw[o * self.d_in + i] = g * xs[i];
                gx[i] += g * w[o * self.d_in + i];
            }
        }
        self.weight.accumulate_grad(&Array1::from(gw));
        self.bias.accumulate_grad(&grad_out.clone());
        Array1::from(gx)
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_input = None;
        }
    }

    pub fn d_in(&self) -> usize {
        self.d_in
    }

    pub fn d_out(&self) -> usize {
        self.d_out
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias_mut(&mut self) -> &mut Tensor {
        &mut self.bias
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    pub(crate) fn weight_bias_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.weight, &mut self.bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_forward() {
        let mut lin = Linear::new(2, 1);
        lin.weight_mut().data_mut()[0] = 2.0;
        lin.weight_mut().data_mut()[1] = 3.0;
        lin.bias_mut().data_mut()[0] = 0.5;

        let y = lin.forward(&Tensor::from_vec(vec![1.0, 2.0], false));
        assert_abs_diff_eq!(y.data()[0], 8.5, epsilon = 1e-6);
    }

    #[test]
    fn test_backward() {
        let mut lin = Linear::new(2, 1);
        lin.weight_mut().data_mut()[0] = 2.0;
        lin.weight_mut().data_mut()[1] = -1.0;

        let _ = lin.forward(&Tensor::from_vec(vec![3.0, 4.0], false));
        let gx = lin.backward(&Array1::from(vec![1.0]));

        let gw = lin.weight().grad().expect("weight grad");
        assert_abs_diff_eq!(gw[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gw[1], 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gx[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gx[1], -1.0, epsilon = 1e-6);
    }
}
