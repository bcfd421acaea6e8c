//! Model checkpointing
//!
//! Parameters are saved to SafeTensors files keyed by their dotted path in
//! the layer tree. Quantized layers store their latent float parameters
//! under the same keys as their float counterparts, so a checkpoint written
//! before quantization loads into a quantized model unchanged.

use crate::error::{Error, Result};
use crate::nn::Layer;
use safetensors::tensor::TensorView;
use safetensors::{serialize, Dtype, SafeTensors};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Save every named parameter of the model
pub fn save_model(model: &Layer, path: &Path) -> Result<()> {
    let mut named = Vec::new();
    model.collect_named("", &mut named);

    let mut views = Vec::with_capacity(named.len());
    for (name, tensor) in &named {
        let bytes: &[u8] = bytemuck::cast_slice(tensor.as_slice());
        let view = TensorView::new(Dtype::F32, tensor.shape().to_vec(), bytes)
            .map_err(|e| Error::Checkpoint(format!("cannot view tensor '{name}': {e}")))?;
        views.push((name.clone(), view));
    }

    let data = serialize(views, &None)
        .map_err(|e| Error::Checkpoint(format!("serialization failed: {e}")))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}

/// Load a checkpoint into the model, strictly
///
/// Every model parameter must be present in the file with a matching shape,
/// and the file must not contain tensors the model has no slot for.
pub fn load_model(model: &mut Layer, path: &Path) -> Result<()> {
    let buf = fs::read(path)?;
    let st = SafeTensors::deserialize(&buf)
        .map_err(|e| Error::Checkpoint(format!("cannot read {}: {e}", path.display())))?;

    let mut named = Vec::new();
    model.collect_named_mut("", &mut named);

    let mut seen: HashSet<String> = HashSet::with_capacity(named.len());
    for (name, param) in named {
        let view = st
            .tensor(&name)
            .map_err(|_| Error::Checkpoint(format!("missing tensor '{name}'")))?;
        if view.dtype() != Dtype::F32 {
            return Err(Error::Checkpoint(format!(
                "tensor '{name}' has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        if view.shape() != param.shape() {
            return Err(Error::ShapeMismatch {
                expected: param.shape().to_vec(),
                got: view.shape().to_vec(),
            });
        }
        // The file buffer may be unaligned for f32
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        for (dst, src) in param.data_mut().iter_mut().zip(values.iter()) {
            *dst = *src;
        }
        seen.insert(name);
    }

    for name in st.names() {
        if !seen.contains(name.as_str()) {
            return Err(Error::Checkpoint(format!(
                "checkpoint tensor '{name}' has no matching model parameter"
            )));
        }
    }
    Ok(())
}
