//! Model construction

mod builder;
mod net;

pub use builder::{build_model, BuildArtifacts, GE_WEIGHT, LR_GAMMA, MILESTONES, WEIGHT_DECAY};
pub use net::{init_weights, upscale_net, CHANNELS, SUPPORTED_SCALES, WIDTH};
