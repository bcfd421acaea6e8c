//! Loss functions
//!
//! Distillation trains the student against the teacher's output with
//! [`MixGeLoss`]: pixel MSE plus a weighted gradient-similarity term that
//! compares finite-difference spatial gradients. Plain MSE doubles as the
//! evaluation criterion, and L1 is kept as an alternative pixel loss.

use crate::tensor::Tensor;
use ndarray::Array1;

/// A differentiable scalar loss over prediction/target pairs
pub trait LossFn {
    /// Scalar loss value
    fn forward(&self, pred: &Tensor, target: &Tensor) -> f32;
    /// Gradient of the loss with respect to the prediction
    fn grad(&self, pred: &Tensor, target: &Tensor) -> Array1<f32>;
    /// Short name for logging
    fn name(&self) -> &'static str;
}

fn check_shapes(pred: &Tensor, target: &Tensor) {
    assert_eq!(
        pred.shape(),
        target.shape(),
        "prediction and target shapes must match"
    );
}

/// Mean squared error
pub struct MseLoss;

impl LossFn for MseLoss {
    fn forward(&self, pred: &Tensor, target: &Tensor) -> f32 {
        check_shapes(pred, target);
        let n = pred.len() as f32;
        pred.data()
            .iter()
            .zip(target.data().iter())
            .map(|(&p, &t)| (p - t) * (p - t))
            .sum::<f32>()
            / n
    }

    fn grad(&self, pred: &Tensor, target: &Tensor) -> Array1<f32> {
        check_shapes(pred, target);
        let n = pred.len() as f32;
        Array1::from_iter(
            pred.data()
                .iter()
                .zip(target.data().iter())
                .map(|(&p, &t)| 2.0 * (p - t) / n),
        )
    }

    fn name(&self) -> &'static str {
        "mse"
    }
}

/// Mean absolute error
pub struct L1Loss;

impl LossFn for L1Loss {
    fn forward(&self, pred: &Tensor, target: &Tensor) -> f32 {
        check_shapes(pred, target);
        let n = pred.len() as f32;
        pred.data()
            .iter()
            .zip(target.data().iter())
            .map(|(&p, &t)| (p - t).abs())
            .sum::<f32>()
            / n
    }

    fn grad(&self, pred: &Tensor, target: &Tensor) -> Array1<f32> {
        check_shapes(pred, target);
        let n = pred.len() as f32;
        Array1::from_iter(pred.data().iter().zip(target.data().iter()).map(
            |(&p, &t)| {
                let d = p - t;
                if d > 0.0 {
                    1.0 / n
                } else if d < 0.0 {
                    -1.0 / n
                } else {
                    0.0
                }
            },
        ))
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}

/// MSE over forward-difference spatial gradient maps
///
/// Inputs must be `[c, h, w]`. Each channel contributes `h*(w-1)` horizontal
/// and `(h-1)*w` vertical difference terms; the loss is the mean squared
/// mismatch over all of them.
pub struct GradientLoss;

impl GradientLoss {
    fn diff_terms(shape: &[usize]) -> usize {
        let (c, h, w) = (shape[0], shape[1], shape[2]);
        // A 1x1 plane has no finite differences to compare
        assert!(
            h > 1 || w > 1,
            "gradient loss needs at least two pixels per channel, got {shape:?}"
        );
        c * (h * (w - 1) + (h - 1) * w)
    }
}

impl LossFn for GradientLoss {
    fn forward(&self, pred: &Tensor, target: &Tensor) -> f32 {
        check_shapes(pred, target);
        let shape = pred.shape();
        assert_eq!(shape.len(), 3, "expected [c, h, w] input, got {shape:?}");
        let (c, h, w) = (shape[0], shape[1], shape[2]);
        let p = pred.as_slice();
        let t = target.as_slice();
        let mut acc = 0.0f32;
        for ch in 0..c {
            let base = ch * h * w;
            for y in 0..h {
                for x in 0..w - 1 {
                    let i = base + y * w + x;
                    let d = (p[i + 1] - p[i]) - (t[i + 1] - t[i]);
                    acc += d * d;
                }
            }
            for y in 0..h - 1 {
                for x in 0..w {
                    let i = base + y * w + x;
                    let d = (p[i + w] - p[i]) - (t[i + w] - t[i]);
                    acc += d * d;
                }
            }
        }
        acc / Self::diff_terms(shape) as f32
    }

    fn grad(&self, pred: &Tensor, target: &Tensor) -> Array1<f32> {
        check_shapes(pred, target);
        let shape = pred.shape();
        assert_eq!(shape.len(), 3, "expected [c, h, w] input, got {shape:?}");
        let (c, h, w) = (shape[0], shape[1], shape[2]);
        let m = Self::diff_terms(shape) as f32;
        let p = pred.as_slice();
        let t = target.as_slice();
        let mut grad = vec![0.0f32; p.len()];
        for ch in 0..c {
            let base = ch * h * w;
            for y in 0..h {
                for x in 0..w - 1 {
                    let i = base + y * w + x;
                    let g = 2.0 * ((p[i + 1] - p[i]) - (t[i + 1] - t[i])) / m;
                    grad[i + 1] += g;
                    grad[i] -= g;
                }
            }
            for y in 0..h - 1 {
                for x in 0..w {
                    let i = base + y * w + x;
                    let g = 2.0 * ((p[i + w] - p[i]) - (t[i + w] - t[i])) / m;
                    grad[i + w] += g;
                    grad[i] -= g;
                }
            }
        }
        Array1::from(grad)
    }

    fn name(&self) -> &'static str {
        "gradient"
    }
}

/// Pixel MSE plus weighted gradient-similarity
pub struct MixGeLoss {
    mse: MseLoss,
    gradient: GradientLoss,
    ge_weight: f32,
}

impl MixGeLoss {
    pub fn new(ge_weight: f32) -> Self {
        Self {
            mse: MseLoss,
            gradient: GradientLoss,
            ge_weight,
        }
    }

    pub fn ge_weight(&self) -> f32 {
        self.ge_weight
    }
}

impl Default for MixGeLoss {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl LossFn for MixGeLoss {
    fn forward(&self, pred: &Tensor, target: &Tensor) -> f32 {
        self.mse.forward(pred, target) + self.ge_weight * self.gradient.forward(pred, target)
    }

    fn grad(&self, pred: &Tensor, target: &Tensor) -> Array1<f32> {
        let mut grad = self.mse.grad(pred, target);
        grad += &(self.gradient.grad(pred, target) * self.ge_weight);
        grad
    }

    fn name(&self) -> &'static str {
        "mix_ge"
    }
}
