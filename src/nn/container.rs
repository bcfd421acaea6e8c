//! Layer containers
//!
//! `Sequential` chains anonymous layers. `Block` is the named top-level
//! container: each slot carries a stable name (used for checkpoint keys) and
//! a flag saying whether the slot participates in quantization. Normalization
//! slots set the flag to `false` and stay in floating point.

use super::Layer;
use crate::tensor::Tensor;
use ndarray::Array1;

/// Ordered chain of layers applied back to back
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let mut cur = x.clone();
        for layer in &mut self.layers {
            cur = layer.forward(&cur);
        }
        cur
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let mut grad = grad_out.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
        grad
    }

    pub fn set_training(&mut self, on: bool) {
        for layer in &mut self.layers {
            layer.set_training(on);
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut Vec<Layer> {
        &mut self.layers
    }

    pub fn into_layers(self) -> Vec<Layer> {
        self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// One named position in a `Block`
pub struct Slot {
    pub name: String,
    pub layer: Layer,
    /// Whether this slot is rewritten when the model is quantized
    pub quantize: bool,
}

impl Slot {
    pub fn new(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            layer,
            quantize: true,
        }
    }

    /// Slot that stays in floating point under quantization
    pub fn float_only(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            layer,
            quantize: false,
        }
    }
}

/// Named sequential container forming the model graph
pub struct Block {
    slots: Vec<Slot>,
}

impl Block {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let mut cur = x.clone();
        for slot in &mut self.slots {
            cur = slot.layer.forward(&cur);
        }
        cur
    }

    pub fn backward(&mut self, grad_out: &Array1<f32>) -> Array1<f32> {
        let mut grad = grad_out.clone();
        for slot in self.slots.iter_mut().rev() {
            grad = slot.layer.backward(&grad);
        }
        grad
    }

    pub fn set_training(&mut self, on: bool) {
        for slot in &mut self.slots {
            slot.layer.set_training(on);
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut Vec<Slot> {
        &mut self.slots
    }

    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}
