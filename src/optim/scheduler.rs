//! Learning-rate schedules

/// Epoch-based learning-rate schedule
pub trait LRScheduler {
    /// Learning rate for the current epoch
    fn get_lr(&self) -> f32;

    /// Advance to the next epoch
    fn step(&mut self);
}

/// Multiplicative decay at fixed epoch milestones
///
/// The rate is `base_lr * gamma^k` where `k` counts milestones at or before
/// the current epoch.
pub struct MultiStepLR {
    base_lr: f32,
    milestones: Vec<usize>,
    gamma: f32,
    epoch: usize,
}

impl MultiStepLR {
    pub fn new(base_lr: f32, milestones: Vec<usize>, gamma: f32) -> Self {
        debug_assert!(milestones.windows(2).all(|w| w[0] < w[1]));
        Self {
            base_lr,
            milestones,
            gamma,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl LRScheduler for MultiStepLR {
    fn get_lr(&self) -> f32 {
        let decays = self.milestones.iter().filter(|&&m| m <= self.epoch).count();
        self.base_lr * self.gamma.powi(decays as i32)
    }

    fn step(&mut self) {
        self.epoch += 1;
    }
}
