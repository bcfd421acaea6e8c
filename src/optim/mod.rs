//! Optimizers and learning-rate schedules

mod adam;
mod scheduler;

pub use adam::Adam;
pub use scheduler::{LRScheduler, MultiStepLR};

use crate::tensor::Tensor;

/// Gradient-based parameter update rule
///
/// Parameters are borrowed from the model for the duration of a step.
pub trait Optimizer {
    /// Apply one update using the gradients stored on the parameters
    fn step(&mut self, params: &mut [&mut Tensor]);

    /// Current learning rate
    fn lr(&self) -> f32;

    /// Set the learning rate (used by schedulers)
    fn set_lr(&mut self, lr: f32);

    /// Clear gradients on all parameters
    fn zero_grad(&self, params: &mut [&mut Tensor]) {
        for p in params.iter() {
            p.zero_grad();
        }
    }
}
