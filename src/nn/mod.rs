//! Neural network layers
//!
//! The layer graph is a closed enum: every layer kind the model builder can
//! emit is a variant of [`Layer`], and structural passes (quantization,
//! checkpointing, summaries) match on the variant instead of inspecting
//! runtime types. Containers hold child `Layer`s, so a model is a tree with
//! a [`Block`] at the root.

mod activation;
mod container;
mod conv;
mod linear;
mod norm;

pub use activation::Relu;
pub use container::{Block, Sequential, Slot};
pub use conv::{Conv2d, ConvTranspose2d};
pub use linear::Linear;
pub use norm::ChannelNorm;

pub(crate) use conv::{conv2d_apply, conv2d_grads, conv_transpose2d_apply, conv_transpose2d_grads};

use crate::quant::{QuantAct, QuantConv2d, QuantConvTranspose2d, QuantLinear};
use crate::tensor::Tensor;
use ndarray::Array1;

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Closed set of layer kinds forming the model graph
pub enum Layer {
    Conv(Conv2d),
    ConvTranspose(ConvTranspose2d),
    Linear(Linear),
    Relu(Relu),
    Norm(ChannelNorm),
    Seq(Sequential),
    Block(Block),
    QuantConv(QuantConv2d),
    QuantConvTranspose(QuantConvTranspose2d),
    QuantLinear(QuantLinear),
    QuantAct(QuantAct),
}

impl Layer {
    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        match self {
            Layer::Conv(l) => l.forward(x),
            Layer::ConvTranspose(l) => l.forward(x),
            Layer::Linear(l) => l.forward(x),
            Layer::Relu(l) => l.forward(x),
            Layer::Norm(l) => l.forward(x),
            Layer::Seq(l) => l.forward(x),
            Layer::Block(l) => l.forward(x),
            Layer::QuantConv(l) => l.forward(x),
            Layer::QuantConvTranspose(l) => l.forward(x),
            Layer::QuantLinear(l) => l.forward(x),
            Layer::QuantAct(l) => l.forward(x),
        }
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        match self {
            Layer::Conv(l) => l.backward(grad_out),
            Layer::ConvTranspose(l) => l.backward(grad_out),
            Layer::Linear(l) => l.backward(grad_out),
            Layer::Relu(l) => l.backward(grad_out),
            Layer::Norm(l) => l.backward(grad_out),
            Layer::Seq(l) => l.backward(grad_out),
            Layer::Block(l) => l.backward(grad_out),
            Layer::QuantConv(l) => l.backward(grad_out),
            Layer::QuantConvTranspose(l) => l.backward(grad_out),
            Layer::QuantLinear(l) => l.backward(grad_out),
            Layer::QuantAct(l) => l.backward(grad_out),
        }
    }

    pub fn set_training(&mut self, on: bool) {
        match self {
            Layer::Conv(l) => l.set_training(on),
            Layer::ConvTranspose(l) => l.set_training(on),
            Layer::Linear(l) => l.set_training(on),
            Layer::Relu(l) => l.set_training(on),
            Layer::Norm(l) => l.set_training(on),
            Layer::Seq(l) => l.set_training(on),
            Layer::Block(l) => l.set_training(on),
            Layer::QuantConv(l) => l.set_training(on),
            Layer::QuantConvTranspose(l) => l.set_training(on),
            Layer::QuantLinear(l) => l.set_training(on),
            Layer::QuantAct(l) => l.set_training(on),
        }
    }

    /// Collect mutable references to every trainable parameter, depth-first
    pub fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        match self {
            Layer::Conv(l) => out.extend(l.params_mut()),
            Layer::ConvTranspose(l) => out.extend(l.params_mut()),
            Layer::Linear(l) => out.extend(l.params_mut()),
            Layer::Relu(_) | Layer::QuantAct(_) => {}
            Layer::Norm(l) => out.extend(l.params_mut()),
            Layer::Seq(l) => {
                for child in l.layers_mut() {
                    child.collect_params_mut(out);
                }
            }
            Layer::Block(l) => {
                for slot in l.slots_mut() {
                    slot.layer.collect_params_mut(out);
                }
            }
            Layer::QuantConv(l) => out.extend(l.params_mut()),
            Layer::QuantConvTranspose(l) => out.extend(l.params_mut()),
            Layer::QuantLinear(l) => out.extend(l.params_mut()),
        }
    }

    /// Collect `(dotted name, parameter)` pairs for checkpointing
    ///
    /// Quantized layers expose their latent float parameters under the same
    /// names as their float counterparts, so checkpoints written before
    /// quantization load into a quantized model and vice versa.
    pub fn collect_named(&self, prefix: &str, out: &mut Vec<(String, Tensor)>) {
        match self {
            Layer::Conv(l) => {
                out.push((join(prefix, "weight"), l.weight().clone()));
                out.push((join(prefix, "bias"), l.bias().clone()));
            }
            Layer::ConvTranspose(l) => {
                out.push((join(prefix, "weight"), l.weight().clone()));
                out.push((join(prefix, "bias"), l.bias().clone()));
            }
            Layer::Linear(l) => {
                out.push((join(prefix, "weight"), l.weight().clone()));
                out.push((join(prefix, "bias"), l.bias().clone()));
            }
            Layer::Relu(_) | Layer::QuantAct(_) => {}
            Layer::Norm(l) => {
                out.push((join(prefix, "gamma"), l.gamma().clone()));
                out.push((join(prefix, "beta"), l.beta().clone()));
            }
            Layer::Seq(l) => {
                for (i, child) in l.layers().iter().enumerate() {
                    child.collect_named(&join(prefix, &i.to_string()), out);
                }
            }
            Layer::Block(l) => {
                for slot in l.slots() {
                    slot.layer.collect_named(&join(prefix, &slot.name), out);
                }
            }
            Layer::QuantConv(l) => {
                out.push((join(prefix, "weight"), l.as_conv().weight().clone()));
                out.push((join(prefix, "bias"), l.as_conv().bias().clone()));
            }
            Layer::QuantConvTranspose(l) => {
                out.push((join(prefix, "weight"), l.as_conv().weight().clone()));
                out.push((join(prefix, "bias"), l.as_conv().bias().clone()));
            }
            Layer::QuantLinear(l) => {
                out.push((join(prefix, "weight"), l.as_linear().weight().clone()));
                out.push((join(prefix, "bias"), l.as_linear().bias().clone()));
            }
        }
    }

    /// Mutable version of [`collect_named`](Self::collect_named), used when
    /// loading a checkpoint
    pub fn collect_named_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, &'a mut Tensor)>,
    ) {
        match self {
            Layer::Conv(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
            Layer::ConvTranspose(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
            Layer::Linear(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
            Layer::Relu(_) | Layer::QuantAct(_) => {}
            Layer::Norm(l) => {
                let name_g = join(prefix, "gamma");
                let name_b = join(prefix, "beta");
                let (g, b) = l.gamma_beta_mut();
                out.push((name_g, g));
                out.push((name_b, b));
            }
            Layer::Seq(l) => {
                for (i, child) in l.layers_mut().iter_mut().enumerate() {
                    child.collect_named_mut(&join(prefix, &i.to_string()), out);
                }
            }
            Layer::Block(l) => {
                for slot in l.slots_mut() {
                    let name = join(prefix, &slot.name);
                    slot.layer.collect_named_mut(&name, out);
                }
            }
            Layer::QuantConv(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.as_conv_mut().weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
            Layer::QuantConvTranspose(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.as_conv_mut().weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
            Layer::QuantLinear(l) => {
                let name_w = join(prefix, "weight");
                let name_b = join(prefix, "bias");
                let (w, b) = l.as_linear_mut().weight_bias_mut();
                out.push((name_w, w));
                out.push((name_b, b));
            }
        }
    }

    /// Zero the gradients of every parameter in the subtree
    pub fn zero_grad(&mut self) {
        let mut params = Vec::new();
        self.collect_params_mut(&mut params);
        for p in params {
            p.zero_grad();
        }
    }

    /// Total number of trainable scalars
    pub fn param_count(&self) -> usize {
        let mut named = Vec::new();
        self.collect_named("", &mut named);
        named.iter().map(|(_, t)| t.len()).sum()
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Layer::Conv(_) => "Conv2d",
            Layer::ConvTranspose(_) => "ConvTranspose2d",
            Layer::Linear(_) => "Linear",
            Layer::Relu(_) => "ReLU",
            Layer::Norm(_) => "ChannelNorm",
            Layer::Seq(_) => "Sequential",
            Layer::Block(_) => "Block",
            Layer::QuantConv(_) => "QuantConv2d",
            Layer::QuantConvTranspose(_) => "QuantConvTranspose2d",
            Layer::QuantLinear(_) => "QuantLinear",
            Layer::QuantAct(_) => "QuantAct",
        }
    }

    /// Append an indented structural description to `out`
    pub fn describe(&self, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        match self {
            Layer::Conv(l) => {
                out.push_str(&format!(
                    "{pad}Conv2d({}, {}, k={})\n",
                    l.c_in(),
                    l.c_out(),
                    l.kernel()
                ));
            }
            Layer::ConvTranspose(l) => {
                out.push_str(&format!(
                    "{pad}ConvTranspose2d({}, {}, stride={})\n",
                    l.c_in(),
                    l.c_out(),
                    l.stride()
                ));
            }
            Layer::Linear(l) => {
                out.push_str(&format!("{pad}Linear({}, {})\n", l.d_in(), l.d_out()));
            }
            Layer::Relu(_) => out.push_str(&format!("{pad}ReLU\n")),
            Layer::Norm(l) => {
                out.push_str(&format!("{pad}ChannelNorm({})\n", l.channels()));
            }
            Layer::Seq(l) => {
                out.push_str(&format!("{pad}Sequential\n"));
                for child in l.layers() {
                    child.describe(indent + 1, out);
                }
            }
            Layer::Block(l) => {
                out.push_str(&format!("{pad}Block\n"));
                for slot in l.slots() {
                    out.push_str(&format!("{pad}  [{}]\n", slot.name));
                    slot.layer.describe(indent + 2, out);
                }
            }
            Layer::QuantConv(l) => {
                let c = l.as_conv();
                out.push_str(&format!(
                    "{pad}QuantConv2d({}, {}, k={}, bits={})\n",
                    c.c_in(),
                    c.c_out(),
                    c.kernel(),
                    l.bits()
                ));
            }
            Layer::QuantConvTranspose(l) => {
                let c = l.as_conv();
                out.push_str(&format!(
                    "{pad}QuantConvTranspose2d({}, {}, stride={}, bits={})\n",
                    c.c_in(),
                    c.c_out(),
                    c.stride(),
                    l.bits()
                ));
            }
            Layer::QuantLinear(l) => {
                let li = l.as_linear();
                out.push_str(&format!(
                    "{pad}QuantLinear({}, {}, bits={})\n",
                    li.d_in(),
                    li.d_out(),
                    l.bits()
                ));
            }
            Layer::QuantAct(l) => {
                out.push_str(&format!("{pad}QuantAct(bits={})\n", l.bits()));
            }
        }
    }

    /// Structural description of the full subtree
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.describe(0, &mut out);
        out
    }
}
