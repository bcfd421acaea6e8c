//! Super-resolution network architectures
//!
//! One architecture per upscale factor. All variants share the same shape:
//! a feature-extraction head, a stack of normalized conv blocks whose depth
//! grows with the factor, a single transposed convolution doing the whole
//! upsample, and an RGB reconstruction tail.

use crate::error::{Error, Result};
use crate::nn::{Block, ChannelNorm, Conv2d, ConvTranspose2d, Layer, Relu, Slot};
use rand::rngs::StdRng;
use rand::Rng;
use std::f32::consts::PI;

/// Feature width of every internal layer
pub const WIDTH: usize = 16;

/// RGB channels in and out
pub const CHANNELS: usize = 3;

/// Upscale factors with a defined architecture
pub const SUPPORTED_SCALES: [usize; 3] = [2, 4, 8];

fn body_depth(scale: usize) -> Result<usize> {
    match scale {
        2 => Ok(2),
        4 => Ok(3),
        8 => Ok(4),
        other => Err(Error::UnsupportedScale(other)),
    }
}

/// Build the float network for the given upscale factor
pub fn upscale_net(scale: usize) -> Result<Layer> {
    let depth = body_depth(scale)?;

    let mut slots = vec![
        Slot::new("head", Layer::Conv(Conv2d::new(CHANNELS, WIDTH, 3))),
        Slot::new("head_act", Layer::Relu(Relu::new())),
    ];
    for d in 0..depth {
        slots.push(Slot::new(
            format!("body{d}"),
            Layer::Conv(Conv2d::new(WIDTH, WIDTH, 3)),
        ));
        slots.push(Slot::float_only(
            format!("norm{d}"),
            Layer::Norm(ChannelNorm::new(WIDTH)),
        ));
        slots.push(Slot::new(format!("act{d}"), Layer::Relu(Relu::new())));
    }
    slots.push(Slot::new(
        "up",
        Layer::ConvTranspose(ConvTranspose2d::new(WIDTH, WIDTH, scale)),
    ));
    slots.push(Slot::new("up_act", Layer::Relu(Relu::new())));
    slots.push(Slot::new("tail", Layer::Conv(Conv2d::new(WIDTH, CHANNELS, 3))));

    Ok(Layer::Block(Block::new(slots)))
}

fn sample_normal(rng: &mut StdRng, mean: f32, std: f32) -> f32 {
    // Box-Muller transform
    let u1: f32 = rng.random::<f32>().max(1e-7);
    let u2: f32 = rng.random();
    mean + std * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn init_weight_tensor(data: &mut ndarray::Array1<f32>, rng: &mut StdRng, std: f32) {
    for v in data.iter_mut() {
        *v = sample_normal(rng, 0.0, std);
    }
}

/// Initialize weights from N(0, 0.01); biases zero, norms identity
pub fn init_weights(layer: &mut Layer, rng: &mut StdRng) {
    const STD: f32 = 0.01;
    match layer {
        Layer::Conv(l) => {
            init_weight_tensor(l.weight_mut().data_mut(), rng, STD);
            l.bias_mut().data_mut().fill(0.0);
        }
        Layer::ConvTranspose(l) => {
            init_weight_tensor(l.weight_mut().data_mut(), rng, STD);
            l.bias_mut().data_mut().fill(0.0);
        }
        Layer::Linear(l) => {
            init_weight_tensor(l.weight_mut().data_mut(), rng, STD);
            l.bias_mut().data_mut().fill(0.0);
        }
        Layer::Norm(l) => {
            l.gamma_mut().data_mut().fill(1.0);
            l.beta_mut().data_mut().fill(0.0);
        }
        Layer::Relu(_) | Layer::QuantAct(_) => {}
        Layer::Seq(l) => {
            for child in l.layers_mut() {
                init_weights(child, rng);
            }
        }
        Layer::Block(l) => {
            for slot in l.slots_mut() {
                init_weights(&mut slot.layer, rng);
            }
        }
        Layer::QuantConv(l) => {
            init_weight_tensor(l.as_conv_mut().weight_mut().data_mut(), rng, STD);
            l.as_conv_mut().bias_mut().data_mut().fill(0.0);
        }
        Layer::QuantConvTranspose(l) => {
            init_weight_tensor(l.as_conv_mut().weight_mut().data_mut(), rng, STD);
            l.as_conv_mut().bias_mut().data_mut().fill(0.0);
        }
        Layer::QuantLinear(l) => {
            init_weight_tensor(l.as_linear_mut().weight_mut().data_mut(), rng, STD);
            l.as_linear_mut().bias_mut().data_mut().fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;
    use rand::SeedableRng;

    #[test]
    fn test_unsupported_scale_rejected() {
        assert!(matches!(upscale_net(3), Err(Error::UnsupportedScale(3))));
        assert!(matches!(upscale_net(16), Err(Error::UnsupportedScale(16))));
    }

    #[test]
    fn test_output_shape_matches_scale() {
        for scale in SUPPORTED_SCALES {
            let mut net = upscale_net(scale).expect("supported scale");
            let mut rng = StdRng::seed_from_u64(0);
            init_weights(&mut net, &mut rng);

            let x = Tensor::zeros(vec![3, 4, 4], false);
            let y = net.forward(&x);
            assert_eq!(y.shape(), &[3, 4 * scale, 4 * scale], "scale {scale}");
        }
    }

    #[test]
    fn test_depth_grows_with_scale() {
        let p2 = upscale_net(2).expect("scale 2").param_count();
        let p4 = upscale_net(4).expect("scale 4").param_count();
        let p8 = upscale_net(8).expect("scale 8").param_count();
        assert!(p2 < p4);
        assert!(p4 < p8);
    }

    #[test]
    fn test_init_is_deterministic() {
        let build = |seed| {
            let mut net = upscale_net(2).expect("scale 2");
            let mut rng = StdRng::seed_from_u64(seed);
            init_weights(&mut net, &mut rng);
            let mut named = Vec::new();
            net.collect_named("", &mut named);
            named
        };
        let a = build(42);
        let b = build(42);
        for ((_, ta), (_, tb)) in a.iter().zip(b.iter()) {
            assert_eq!(ta.data(), tb.data());
        }
    }

    #[test]
    fn test_init_statistics() {
        let mut net = upscale_net(8).expect("scale 8");
        let mut rng = StdRng::seed_from_u64(7);
        init_weights(&mut net, &mut rng);

        let mut named = Vec::new();
        net.collect_named("", &mut named);
        let weights: Vec<f32> = named
            .iter()
            .filter(|(name, _)| name.ends_with("weight"))
            .flat_map(|(_, t)| t.data().iter().copied().collect::<Vec<_>>())
            .collect();
        let n = weights.len() as f32;
        let mean = weights.iter().sum::<f32>() / n;
        let std = (weights.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / n).sqrt();
        assert!(mean.abs() < 2e-3);
        assert!((std - 0.01).abs() < 2e-3);
    }
}
