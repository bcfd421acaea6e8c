//! Quantized layer wrappers
//!
//! Each wrapper owns the float layer it replaces and keeps training in
//! floating point: the forward pass runs on quantize→dequantize'd weights
//! (and activations for [`QuantAct`]), while gradients flow to the latent
//! float parameters through the straight-through estimator. `set_param`
//! copies parameters bit-exact from the float layer being replaced.

use super::UniformQuantizer;
use crate::nn::{
    conv2d_apply, conv2d_grads, conv_transpose2d_apply, conv_transpose2d_grads, Conv2d,
    ConvTranspose2d, Linear,
};
use crate::tensor::Tensor;
use ndarray::Array1;

/// Convolution computing on 8-bit (by default) fake-quantized weights
pub struct QuantConv2d {
    inner: Conv2d,
    weight_quant: UniformQuantizer,
    cached_qw: Option<Vec<f32>>,
    cached_input: Option<Tensor>,
    training: bool,
}

impl QuantConv2d {
    pub fn new(c_in: usize, c_out: usize, k: usize, bits: usize) -> Self {
        Self {
            inner: Conv2d::new(c_in, c_out, k),
            weight_quant: UniformQuantizer::new(bits),
            cached_qw: None,
            cached_input: None,
            training: true,
        }
    }

    /// Build a quantized replacement carrying the float layer's parameters
    pub fn from_float(conv: &Conv2d, bits: usize) -> Self {
        let mut q = Self::new(conv.c_in(), conv.c_out(), conv.kernel(), bits);
        q.set_param(conv);
        q
    }

    /// Copy weights and bias bit-exact from a float convolution
    ///
    /// # Panics
    ///
    /// Panics if the layer dimensions differ.
    pub fn set_param(&mut self, conv: &Conv2d) {
        assert_eq!(self.inner.c_in(), conv.c_in(), "input channel mismatch");
        assert_eq!(self.inner.c_out(), conv.c_out(), "output channel mismatch");
        assert_eq!(self.inner.kernel(), conv.kernel(), "kernel size mismatch");
        self.inner
            .weight_mut()
            .data_mut()
            .assign(conv.weight().data());
        self.inner.bias_mut().data_mut().assign(conv.bias().data());
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        // Weights move every step, so the scale is recalibrated per forward
        self.weight_quant.calibrate(self.inner.weight().as_slice());
        let qw = self.weight_quant.apply_slice(self.inner.weight().as_slice());
        let out = conv2d_apply(
            &qw,
            self.inner.bias().as_slice(),
            x,
            self.inner.c_in(),
            self.inner.c_out(),
            self.inner.kernel(),
        );
        if self.training {
            self.cached_qw = Some(qw);
            self.cached_input = Some(x.clone());
        }
        out
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let qw = self
            .cached_qw
            .as_ref()
            .expect("backward called without a cached forward input");
        let (gw, gb, gx) = conv2d_grads(
            qw,
            x,
            grad_out,
            self.inner.c_in(),
            self.inner.c_out(),
            self.inner.kernel(),
        );
        // STE: gradient w.r.t. the quantized weight lands on the latent weight
        self.inner.weight().accumulate_grad(&gw);
        self.inner.bias().accumulate_grad(&gb);
        gx
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_qw = None;
            self.cached_input = None;
        }
    }

    pub fn bits(&self) -> usize {
        self.weight_quant.bits()
    }

    pub fn as_conv(&self) -> &Conv2d {
        &self.inner
    }

    pub fn as_conv_mut(&mut self) -> &mut Conv2d {
        &mut self.inner
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.inner.params_mut()
    }
}

/// Transposed convolution computing on fake-quantized weights
pub struct QuantConvTranspose2d {
    inner: ConvTranspose2d,
    weight_quant: UniformQuantizer,
    cached_qw: Option<Vec<f32>>,
    cached_input: Option<Tensor>,
    training: bool,
}

impl QuantConvTranspose2d {
    pub fn new(c_in: usize, c_out: usize, stride: usize, bits: usize) -> Self {
        Self {
            inner: ConvTranspose2d::new(c_in, c_out, stride),
            weight_quant: UniformQuantizer::new(bits),
            cached_qw: None,
            cached_input: None,
            training: true,
        }
    }

    pub fn from_float(conv: &ConvTranspose2d, bits: usize) -> Self {
        let mut q = Self::new(conv.c_in(), conv.c_out(), conv.stride(), bits);
        q.set_param(conv);
        q
    }

    /// Copy weights and bias bit-exact from a float transposed convolution
    ///
    /// # Panics
    ///
    /// Panics if the layer dimensions differ.
    pub fn set_param(&mut self, conv: &ConvTranspose2d) {
        assert_eq!(self.inner.c_in(), conv.c_in(), "input channel mismatch");
        assert_eq!(self.inner.c_out(), conv.c_out(), "output channel mismatch");
        assert_eq!(self.inner.stride(), conv.stride(), "stride mismatch");
        self.inner
            .weight_mut()
            .data_mut()
            .assign(conv.weight().data());
        self.inner.bias_mut().data_mut().assign(conv.bias().data());
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        self.weight_quant.calibrate(self.inner.weight().as_slice());
        let qw = self.weight_quant.apply_slice(self.inner.weight().as_slice());
        let out = conv_transpose2d_apply(
            &qw,
            self.inner.bias().as_slice(),
            x,
            self.inner.c_in(),
            self.inner.c_out(),
            self.inner.stride(),
        );
        if self.training {
            self.cached_qw = Some(qw);
            self.cached_input = Some(x.clone());
        }
        out
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let qw = self
            .cached_qw
            .as_ref()
            .expect("backward called without a cached forward input");
        let (gw, gb, gx) = conv_transpose2d_grads(
            qw,
            x,
            grad_out,
            self.inner.c_in(),
            self.inner.c_out(),
            self.inner.stride(),
        );
        self.inner.weight().accumulate_grad(&gw);
        self.inner.bias().accumulate_grad(&gb);
        gx
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_qw = None;
            self.cached_input = None;
        }
    }

    pub fn bits(&self) -> usize {
        self.weight_quant.bits()
    }

    pub fn as_conv(&self) -> &ConvTranspose2d {
        &self.inner
    }

    pub fn as_conv_mut(&mut self) -> &mut ConvTranspose2d {
        &mut self.inner
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.inner.params_mut()
    }
}

/// Fully-connected layer computing on fake-quantized weights
pub struct QuantLinear {
    inner: Linear,
    weight_quant: UniformQuantizer,
    cached_qw: Option<Vec<f32>>,
    cached_input: Option<Tensor>,
    training: bool,
}

impl QuantLinear {
    pub fn new(d_in: usize, d_out: usize, bits: usize) -> Self {
        Self {
            inner: Linear::new(d_in, d_out),
            weight_quant: UniformQuantizer::new(bits),
            cached_qw: None,
            cached_input: None,
            training: true,
        }
    }

    pub fn from_float(linear: &Linear, bits: usize) -> Self {
        let mut q = Self::new(linear.d_in(), linear.d_out(), bits);
        q.set_param(linear);
        q
    }

    /// Copy weights and bias bit-exact from a float layer
    ///
    /// # Panics
    ///
    /// Panics if the layer dimensions differ.
    pub fn set_param(&mut self, linear: &Linear) {
        assert_eq!(self.inner.d_in(), linear.d_in(), "input size mismatch");
        assert_eq!(self.inner.d_out(), linear.d_out(), "output size mismatch");
        self.inner
            .weight_mut()
            .data_mut()
            .assign(linear.weight().data());
        self.inner.bias_mut().data_mut().assign(linear.bias().data());
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let (d_in, d_out) = (self.inner.d_in(), self.inner.d_out());
        assert_eq!(x.len(), d_in, "expected {d_in} input features");
        self.weight_quant.calibrate(self.inner.weight().as_slice());
        let qw = self.weight_quant.apply_slice(self.inner.weight().as_slice());
        let b = self.inner.bias().as_slice();
        let xs = x.as_slice();
        let mut out = vec![0.0f32; d_out];
        for o in 0..d_out {
            let mut acc = b[o];
            for i in 0..d_in {
                acc += qw[o * d_in + i] * xs[i];
            }
            out[o] = acc;
        }
        if self.training {
            self.cached_qw = Some(qw);
            self.cached_input = Some(x.clone());
        }
        Tensor::from_vec(out, false)
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let qw = self
            .cached_qw
            .as_ref()
            .expect("backward called without a cached forward input");
        let (d_in, d_out) = (self.inner.d_in(), self.inner.d_out());
        let xs = x.as_slice();
        let mut gw = vec![0.0f32; d_out * d_in];
        let mut gx = vec![0.0f32; d_in];
        for o in 0..d_out {
            let g = grad_out[o];
            for i in 0..d_in {
                gw[o * d_in + i] = g * xs[i];
                gx[i] += g * qw[o * d_in + i];
            }
        }
        self.inner.weight().accumulate_grad(&Array1::from(gw));
        self.inner.bias().accumulate_grad(&grad_out.clone());
        Array1::from(gx)
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_qw = None;
            self.cached_input = None;
        }
    }

    pub fn bits(&self) -> usize {
        self.weight_quant.bits()
    }

    pub fn as_linear(&self) -> &Linear {
        &self.inner
    }

    pub fn as_linear_mut(&mut self) -> &mut Linear {
        &mut self.inner
    }

    pub fn params_mut(&mut self) -> Vec<&mut Tensor> {
        self.inner.params_mut()
    }
}

/// Activation fake-quantizer inserted after each ReLU
///
/// Training recalibrates the scale on every batch; evaluation reuses the
/// last calibrated scale so inference sees a fixed grid.
pub struct QuantAct {
    quantizer: UniformQuantizer,
    training: bool,
}

impl QuantAct {
    pub fn new(bits: usize) -> Self {
        Self {
            quantizer: UniformQuantizer::new(bits),
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        if self.training || !self.quantizer.is_initialized() {
            self.quantizer.calibrate(x.as_slice());
        }
        let out = self.quantizer.apply_slice(x.as_slice());
        Tensor::from_shape_vec(x.shape().to_vec(), out, false)
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        self.quantizer.ste_backward(grad_out)
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
    }

    pub fn bits(&self) -> usize {
        self.quantizer.bits()
    }

    pub fn scale(&self) -> f32 {
        self.quantizer.scale()
    }
}
