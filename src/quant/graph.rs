//! Structural quantization pass
//!
//! Rewrites a model tree into its quantized counterpart: convolutions,
//! transposed convolutions and linear layers become their fake-quantized
//! wrappers (parameters copied bit-exact), each ReLU gains an activation
//! quantizer after it, and normalization layers pass through unchanged.
//! Containers are preserved, so the rewritten tree has the same shape as the
//! original. Block slots marked `quantize: false` are left untouched whatever
//! they hold.

use super::{QuantAct, QuantConv2d, QuantConvTranspose2d, QuantLinear, QuantSpec};
use crate::nn::{Block, Layer, Sequential, Slot};

/// Rewrite one layer subtree into its quantized form
pub fn quantize_layer(layer: Layer, spec: &QuantSpec) -> Layer {
    match layer {
        Layer::Conv(conv) => {
            Layer::QuantConv(QuantConv2d::from_float(&conv, spec.weight_bits))
        }
        Layer::ConvTranspose(conv) => Layer::QuantConvTranspose(
            QuantConvTranspose2d::from_float(&conv, spec.weight_bits),
        ),
        Layer::Linear(linear) => {
            Layer::QuantLinear(QuantLinear::from_float(&linear, spec.weight_bits))
        }
        Layer::Relu(relu) => Layer::Seq(Sequential::new(vec![
            Layer::Relu(relu),
            Layer::QuantAct(QuantAct::new(spec.act_bits)),
        ])),
        Layer::Norm(norm) => Layer::Norm(norm),
        Layer::Seq(seq) => Layer::Seq(Sequential::new(
            seq.into_layers()
                .into_iter()
                .map(|child| quantize_layer(child, spec))
                .collect(),
        )),
        Layer::Block(block) => Layer::Block(Block::new(
            block
                .into_slots()
                .into_iter()
                .map(|slot| {
                    if slot.quantize {
                        Slot {
                            name: slot.name,
                            layer: quantize_layer(slot.layer, spec),
                            quantize: slot.quantize,
                        }
                    } else {
                        slot
                    }
                })
                .collect(),
        )),
        // Already quantized layers pass through
        quantized @ (Layer::QuantConv(_)
        | Layer::QuantConvTranspose(_)
        | Layer::QuantLinear(_)
        | Layer::QuantAct(_)) => quantized,
    }
}

/// Quantize a whole model tree
pub fn quantize_model(model: Layer, spec: &QuantSpec) -> Layer {
    quantize_layer(model, spec)
}
