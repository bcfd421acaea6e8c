//! Convolution and transposed-convolution layers
//!
//! `Conv2d` is a stride-1 convolution with zero padding that preserves the
//! spatial size (odd kernels). `ConvTranspose2d` is the upsampling head: its
//! kernel equals its stride, so a `[c, h, w]` input maps to `[c', h*s, w*s]`
//! with non-overlapping output blocks.
//!
//! The arithmetic lives in free functions over raw weight slices so the
//! quantized wrappers can run the same kernels with a quantized weight buffer.

use crate::tensor::Tensor;
use ndarray::Array1;

fn spatial(x: &Tensor, c_in: usize) -> (usize, usize) {
    let shape = x.shape();
    assert_eq!(shape.len(), 3, "expected [c, h, w] input, got {shape:?}");
    assert_eq!(shape[0], c_in, "expected {c_in} input channels, got {}", shape[0]);
    (shape[1], shape[2])
}

/// Apply a same-padded stride-1 convolution with the given weight buffer
///
/// Weight layout: `[c_out, c_in, k, k]` flattened.
pub(crate) fn conv2d_apply(
    w: &[f32],
    b: &[f32],
    x: &Tensor,
    c_in: usize,
    c_out: usize,
    k: usize,
) -> Tensor {
    let (h, wd) = spatial(x, c_in);
    let pad = k / 2;
    let xs = x.as_slice();
    let mut out = vec![0.0f32; c_out * h * wd];

    for co in 0..c_out {
        for y in 0..h {
            for xx in 0..wd {
                let mut acc = b[co];
                for ci in 0..c_in {
                    for dy in 0..k {
                        let iy = y + dy;
                        if iy < pad || iy >= h + pad {
                            continue;
                        }
                        let iy = iy - pad;
                        for dx in 0..k {
                            let ix = xx + dx;
                            if ix < pad || ix >= wd + pad {
                                continue;
                            }
                            let ix = ix - pad;
                            acc += w[((co * c_in + ci) * k + dy) * k + dx]
                                * xs[(ci * h + iy) * wd + ix];
                        }
                    }
                }
                out[(co * h + y) * wd + xx] = acc;
            }
        }
    }

    Tensor::from_shape_vec(vec![c_out, h, wd], out, false)
}

/// Gradients of a same-padded stride-1 convolution
///
/// Returns `(grad_weight, grad_bias, grad_input)`.
pub(crate) fn conv2d_grads(
    w: &[f32],
    x: &Tensor,
    grad_out: &Array1<f32>,
    c_in: usize,
    c_out: usize,
    k: usize,
) -> (Array1<f32>, Array1<f32>, Array1<f32>) {
    let (h, wd) = spatial(x, c_in);
    let pad = k / 2;
    let xs = x.as_slice();
    let mut gw = vec![0.0f32; c_out * c_in * k * k];
    let mut gb = vec![0.0f32; c_out];
    let mut gx = vec![0.0f32; c_in * h * wd];

    for co in 0..c_out {
        for y in 0..h {
            for xx in 0..wd {
                let g = grad_out[(co * h + y) * wd + xx];
                gb[co] += g;
                for ci in 0..c_in {
                    for dy in 0..k {
                        let iy = y + dy;
                        if iy < pad || iy >= h + pad {
                            continue;
                        }
                        let iy = iy - pad;
                        for dx in 0..k {
                            let ix = xx + dx;
                            if ix < pad || ix >= wd + pad {
                                continue;
                            }
                            let ix = ix - pad;
                            let widx = ((co * c_in + ci) * k + dy) * k + dx;
                            let xidx = (ci * h + iy) * wd + ix;
                            gw[widx] += g * xs[xidx];
                            gx[xidx] += g * w[widx];
                        }
                    }
                }
            }
        }
    }

    (Array1::from(gw), Array1::from(gb), Array1::from(gx))
}

/// Apply a transposed convolution with kernel == stride
///
/// Weight layout: `[c_in, c_out, s, s]` flattened.
pub(crate) fn conv_transpose2d_apply(
    w: &[f32],
    b: &[f32],
    x: &Tensor,
    c_in: usize,
    c_out: usize,
    s: usize,
) -> Tensor {
    let (h, wd) = spatial(x, c_in);
    let (oh, ow) = (h * s, wd * s);
    let xs = x.as_slice();
    let mut out = vec![0.0f32; c_out * oh * ow];

    for co in 0..c_out {
        for oy in 0..oh {
            for ox in 0..ow {
                out[(co * oh + oy) * ow + ox] = b[co];
            }
        }
    }
    for ci in 0..c_in {
        for y in 0..h {
            for xx in 0..wd {
                let v = xs[(ci * h + y) * wd + xx];
                for co in 0..c_out {
                    for dy in 0..s {
                        for dx in 0..s {
                            out[(co * oh + y * s + dy) * ow + xx * s + dx] +=
                                w[((ci * c_out + co) * s + dy) * s + dx] * v;
                        }
                    }
                }
            }
        }
    }

    Tensor::from_shape_vec(vec![c_out, oh, ow], out, false)
}

/// Gradients of a transposed convolution with kernel == stride
pub(crate) fn conv_transpose2d_grads(
    w: &[f32],
    x: &Tensor,
    grad_out: &Array1<f32>,
    c_in: usize,
    c_out: usize,
    s: usize,
) -> (Array1<f32>, Array1<f32>, Array1<f32>) {
    let (h, wd) = spatial(x, c_in);
    let (oh, ow) = (h * s, wd * s);
    let xs = x.as_slice();
    let mut gw = vec![0.0f32; c_in * c_out * s * s];
    let mut gb = vec![0.0f32; c_out];
    let mut gx = vec![0.0f32; c_in * h * wd];

    for co in 0..c_out {
        for oy in 0..oh {
            for ox in 0..ow {
                gb[co] += grad_out[(co * oh + oy) * ow + ox];
            }
        }
    }
    for ci in 0..c_in {
        for y in 0..h {
            for xx in 0..wd {
                let v = xs[(ci * h + y) * wd + xx];
                let mut gin = 0.0;
                for co in 0..c_out {
                    for dy in 0..s {
                        for dx in 0..s {
                            let g = grad_out[(co * oh + y * s + dy) * ow + xx * s + dx];
                            let widx = ((ci * c_out + co) * s + dy) * s + dx;
                            gw[widx] += g * v;
                            gin += g * w[widx];
                        }
                    }
                }
                gx[(ci * h + y) * wd + xx] = gin;
            }
        }
    }

    (Array1::from(gw), Array1::from(gb), Array1::from(gx))
}

/// Stride-1 same-padded 2D convolution layer
pub struct Conv2d {
    weight: Tensor,
    bias: Tensor,
    c_in: usize,
    c_out: usize,
    k: usize,
    cached_input: Option<Tensor>,
    training: bool,
}

impl Conv2d {
    /// Create a zero-initialized convolution; `k` must be odd
    pub fn new(c_in: usize, c_out: usize, k: usize) -> Self {
        assert!(k % 2 == 1, "same-padded convolution requires an odd kernel");
        Self {
            weight: Tensor::zeros(vec![c_out, c_in, k, k], true),
            bias: Tensor::zeros(vec![c_out], true),
            c_in,
            c_out,
            k,
            cached_input: None,
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        if self.training {
            self.cached_input = Some(x.clone());
        }
        conv2d_apply(
            self.weight.as_slice(),
            self.bias.as_slice(),
            x,
            self.c_in,
            self.c_out,
            self.k,
        )
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let (gw, gb, gx) = conv2d_grads(
            self.weight.as_slice(),
            x,
            grad_out,
            self.c_in,
            self.c_out,
            self.k,
        );
        self.weight.accumulate_grad(&gw);
        self.bias.accumulate_grad(&gb);
        gx
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_input = None;
        }
    }

    pub fn c_in(&self) -> usize {
        self.c_in
    }

    pub fn c_out(&self) -> usize {
        self.c_out
    }

    pub fn kernel(&self) -> usize {
        self.k
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

/// Transposed convolution with kernel == stride (exact integer upsampling)
pub struct ConvTranspose2d {
    weight: Tensor,
    bias: Tensor,
    c_in: usize,
    c_out: usize,
    stride: usize,
    cached_input: Option<Tensor>,
    training: bool,
}

impl ConvTranspose2d {
    pub fn new(c_in: usize, c_out: usize, stride: usize) -> Self {
        assert!(stride >= 1, "stride must be at least 1");
        Self {
            weight: Tensor::zeros(vec![c_in, c_out, stride, stride], true),
            bias: Tensor::zeros(vec![c_out], true),
            c_in,
            c_out,
            stride,
            cached_input: None,
            training: true,
        }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        if self.training {
            self.cached_input = Some(x.clone());
        }
        conv_transpose2d_apply(
            self.weight.as_slice(),
            self.bias.as_slice(),
            x,
            self.c_in,
            self.c_out,
            self.stride,
        )
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let x = self
            .cached_input
            .as_ref()
            .expect("backward called without a cached forward input");
        let (gw, gb, gx) = conv_transpose2d_grads(
            self.weight.as_slice(),
            x,
            grad_out,
            self.c_in,
            self.c_out,
            self.stride,
        );
        self.weight.accumulate_grad(&gw);
        self.bias.accumulate_grad(&gb);
        gx
    }

    pub fn set_training(&mut self, on: bool) {
        self.training = on;
        if !on {
            self.cached_input = None;
        }
    }

    pub fn c_in(&self) -> usize {
        self.c_in
    }

    pub fn c_out(&self) -> usize {
        self.c_out
    }

    pub fn stride(&self) -> usize {
        self.stride
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
    fn test_conv_identity_kernel() {
        // 3x3 kernel with only the center tap set reproduces the input
        let mut conv = Conv2d::new(1, 1, 3);
        conv.weight_mut().data_mut()[4] = 1.0;

        let x = Tensor::from_shape_vec(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], false);
        let y = conv.forward(&x);

        assert_eq!(y.shape(), &[1, 2, 2]);
        for (a, b) in y.data().iter().zip(x.data().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_conv_bias() {
        let mut conv = Conv2d::new(1, 2, 1);
        conv.bias_mut().data_mut()[0] = 0.5;
        conv.bias_mut().data_mut()[1] = -1.0;

        let x = Tensor::from_shape_vec(vec![1, 1, 1], vec![0.0], false);
        let y = conv.forward(&x);

        assert_abs_diff_eq!(y.data()[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_conv_backward_k1() {
        // 1x1 conv is a scalar multiply: y = w*x + b, so
        // dL/dw = sum(g*x), dL/db = sum(g), dL/dx = g*w
        let mut conv = Conv2d::new(1, 1, 1);
        conv.weight_mut().data_mut()[0] = 2.0;

        let x = Tensor::from_shape_vec(vec![1, 1, 2], vec![3.0, 4.0], false);
        let _ = conv.forward(&x);

        let grad_out = Array1::from(vec![1.0, 0.5]);
        let grad_in = conv.backward(&grad_out);

        let gw = conv.weight().grad().expect("weight grad");
        let gb = conv.bias().grad().expect("bias grad");
        assert_abs_diff_eq!(gw[0], 1.0 * 3.0 + 0.5 * 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(gb[0], 1.5, epsilon = 1e-5);
        assert_abs_diff_eq!(grad_in[0], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(grad_in[1], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_conv_transpose_upsamples() {
        let mut up = ConvTranspose2d::new(1, 1, 2);
        for v in up.weight_mut().data_mut().iter_mut() {
            *v = 1.0;
        }

        let x = Tensor::from_shape_vec(vec![1, 1, 1], vec![3.0], false);
        let y = up.forward(&x);

        assert_eq!(y.shape(), &[1, 2, 2]);
        for &v in y.data().iter() {
            assert_abs_diff_eq!(v, 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_conv_transpose_backward() {
        let mut up = ConvTranspose2d::new(1, 1, 2);
        for v in up.weight_mut().data_mut().iter_mut() {
            *v = 0.5;
        }

        let x = Tensor::from_shape_vec(vec![1, 1, 1], vec![2.0], false);
        let _ = up.forward(&x);

        let grad_out = Array1::from(vec![1.0, 1.0, 1.0, 1.0]);
        let grad_in = up.backward(&grad_out);

        // Each of the 4 output taps contributes w to the single input
        assert_abs_diff_eq!(grad_in[0], 2.0, epsilon = 1e-5);
        let gw = up.weight().grad().expect("weight grad");
        for &g in gw.iter() {
            assert_abs_diff_eq!(g, 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_eval_mode_skips_cache() {
        let mut conv = Conv2d::new(1, 1, 3);
        conv.set_training(false);
        let x = Tensor::zeros(vec![1, 2, 2], false);
        let _ = conv.forward(&x);
        assert!(conv.cached_input.is_none());
    }
}
