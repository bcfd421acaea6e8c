//! Adam optimizer

use super::Optimizer;
use crate::tensor::Tensor;
use ndarray::Array1;

/// Adam with optional decoupled-into-gradient weight decay
///
/// Moment buffers are keyed by parameter position, so the same parameter
/// ordering must be passed to every step.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Array1<f32>>,
    v: Vec<Array1<f32>>,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        while self.m.len() < params.len() {
            let len = params[self.m.len()].len();
            self.m.push(Array1::zeros(len));
            self.v.push(Array1::zeros(len));
        }
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t as i32);
        let bc2 = 1.0 - self.beta2.powi(self.t as i32);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(mut grad) = param.grad() else {
                continue;
            };
            if self.weight_decay != 0.0 {
                grad = grad + &(param.data() * self.weight_decay);
            }

            let m = &mut self.m[i];
            let v = &mut self.v[i];
            for j in 0..grad.len() {
                m[j] = self.beta1 * m[j] + (1.0 - self.beta1) * grad[j];
                v[j] = self.beta2 * v[j] + (1.0 - self.beta2) * grad[j] * grad[j];
                let m_hat = m[j] / bc1;
                let v_hat = v[j] / bc2;
                param.data_mut()[j] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
