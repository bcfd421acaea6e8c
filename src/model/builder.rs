//! Model builder
//!
//! Bundles everything one training run needs: the initialized network for
//! the requested upscale factor, the distillation criterion, the pixel loss
//! used for evaluation, the optimizer, and the learning-rate schedule.

use super::net::{init_weights, upscale_net};
use crate::error::Result;
use crate::loss::{L1Loss, MixGeLoss, MseLoss};
use crate::nn::Layer;
use crate::optim::{Adam, MultiStepLR};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Epochs at which the learning rate is halved
pub const MILESTONES: [usize; 8] = [50, 100, 150, 200, 300, 400, 500, 1000];

/// Decay factor applied at each milestone
pub const LR_GAMMA: f32 = 0.5;

/// Adam weight decay
pub const WEIGHT_DECAY: f32 = 1e-6;

/// Weight of the gradient-similarity term in the training loss
pub const GE_WEIGHT: f32 = 0.1;

/// Everything a training run needs, produced by [`build_model`]
pub struct BuildArtifacts {
    pub model: Layer,
    pub criterion: MixGeLoss,
    pub pixel_loss: MseLoss,
    /// Alternative pixel criterion, kept alongside MSE
    pub l1_loss: L1Loss,
    pub optimizer: Adam,
    pub scheduler: MultiStepLR,
}

/// Build an initialized model and its training companions
pub fn build_model(scale: usize, lr: f32, seed: u64) -> Result<BuildArtifacts> {
    let mut model = upscale_net(scale)?;
    let mut rng = StdRng::seed_from_u64(seed);
    init_weights(&mut model, &mut rng);

    Ok(BuildArtifacts {
        model,
        criterion: MixGeLoss::new(GE_WEIGHT),
        pixel_loss: MseLoss,
        l1_loss: L1Loss,
        optimizer: Adam::new(lr).with_weight_decay(WEIGHT_DECAY),
        scheduler: MultiStepLR::new(lr, MILESTONES.to_vec(), LR_GAMMA),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::optim::{LRScheduler, Optimizer};

    #[test]
    fn test_builds_supported_scales() {
        for scale in [2, 4, 8] {
            let artifacts = build_model(scale, 1e-3, 0).expect("supported scale");
            assert!(artifacts.model.param_count() > 0);
        }
    }

    #[test]
    fn test_rejects_unsupported_scale() {
        assert!(matches!(
            build_model(5, 1e-3, 0),
            Err(Error::UnsupportedScale(5))
        ));
    }

    #[test]
    fn test_optimizer_and_scheduler_share_base_lr() {
        let artifacts = build_model(2, 2e-3, 0).expect("scale 2");
        assert_eq!(artifacts.optimizer.lr(), 2e-3);
        assert_eq!(artifacts.scheduler.get_lr(), 2e-3);
        assert_eq!(artifacts.optimizer.weight_decay(), WEIGHT_DECAY);
    }
}
