//! Post-training quantization
//!
//! [`UniformQuantizer`] implements the symmetric fake-quantization scheme,
//! the layer wrappers in [`layers`] run it inside the forward pass, and
//! [`graph`] rewrites a whole model tree into its quantized counterpart.

mod graph;
mod layers;
mod scheme;

pub use graph::{quantize_layer, quantize_model};
pub use layers::{QuantAct, QuantConv2d, QuantConvTranspose2d, QuantLinear};
pub use scheme::{QuantSpec, UniformQuantizer};
