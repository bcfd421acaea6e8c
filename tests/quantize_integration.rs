//! Quantization pass over full super-resolution models

use ampliar::model::{build_model, upscale_net, SUPPORTED_SCALES};
use ampliar::nn::Layer;
use ampliar::quant::{quantize_model, QuantSpec};
use ampliar::tensor::Tensor;

fn slot_kinds(model: &Layer) -> Vec<(String, &'static str)> {
    let Layer::Block(block) = model else {
        panic!("model root is a block");
    };
    block
        .slots()
        .iter()
        .map(|s| (s.name.clone(), s.layer.kind_name()))
        .collect()
}

#[test]
fn quantized_model_rewrites_every_compute_slot() {
    let model = upscale_net(4).expect("scale 4");
    let quant = quantize_model(model, &QuantSpec::default());

    for (name, kind) in slot_kinds(&quant) {
        match name.as_str() {
            "head" | "tail" => assert_eq!(kind, "QuantConv2d", "slot {name}"),
            "up" => assert_eq!(kind, "QuantConvTranspose2d"),
            n if n.starts_with("body") => assert_eq!(kind, "QuantConv2d", "slot {name}"),
            n if n.starts_with("norm") => assert_eq!(kind, "ChannelNorm", "slot {name}"),
            // Every activation becomes relu + activation quantizer
            _ => assert_eq!(kind, "Sequential", "slot {name}"),
        }
    }
}

#[test]
fn quantized_model_keeps_parameter_names_and_values() {
    let model = build_model(2, 1e-3, 5).expect("build").model;
    let mut before = Vec::new();
    model.collect_named("", &mut before);

    let quant = quantize_model(model, &QuantSpec::default());
    let mut after = Vec::new();
    quant.collect_named("", &mut after);

    assert_eq!(before.len(), after.len());
    for ((name_a, ta), (name_b, tb)) in before.iter().zip(after.iter()) {
        assert_eq!(name_a, name_b);
        assert_eq!(ta.shape(), tb.shape());
        assert_eq!(ta.data(), tb.data());
    }
}

#[test]
fn quantized_forward_preserves_output_shape() {
    for scale in SUPPORTED_SCALES {
        let model = build_model(scale, 1e-3, 0).expect("build").model;
        let mut quant = quantize_model(model, &QuantSpec::default());

        let x = Tensor::zeros(vec![3, 4, 4], false);
        let y = quant.forward(&x);
        assert_eq!(y.shape(), &[3, 4 * scale, 4 * scale], "scale {scale}");
    }
}

#[test]
fn quantized_output_stays_close_to_float() {
    let float = build_model(2, 1e-3, 9).expect("build");
    let mut float_model = float.model;

    let mut reference = upscale_net(2).expect("scale 2");
    {
        let mut src = Vec::new();
        float_model.collect_named("", &mut src);
        let mut dst = Vec::new();
        reference.collect_named_mut("", &mut dst);
        for ((_, s), (_, d)) in src.iter().zip(dst.iter_mut()) {
            d.data_mut().assign(s.data());
        }
    }
    let mut quant = quantize_model(float_model, &QuantSpec::default());

    let x = Tensor::from_shape_vec(
        vec![3, 4, 4],
        (0..48).map(|i| (i as f32) / 48.0).collect(),
        false,
    );
    let yf = reference.forward(&x);
    let yq = quant.forward(&x);

    let max_err = yf
        .data()
        .iter()
        .zip(yq.data().iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    // 8 bits keep the fake-quantized network close to the float one
    assert!(max_err < 0.05, "max error {max_err}");
}

#[test]
fn quantized_backward_reaches_all_parameters() {
    let model = build_model(2, 1e-3, 1).expect("build").model;
    let mut quant = quantize_model(model, &QuantSpec::default());

    let x = Tensor::from_shape_vec(
        vec![3, 4, 4],
        (0..48).map(|i| 0.1 + (i as f32) * 0.01).collect(),
        false,
    );
    let y = quant.forward(&x);
    let grad = ndarray::Array1::ones(y.len());
    let _ = quant.backward(&grad);

    let mut params = Vec::new();
    quant.collect_params_mut(&mut params);
    for p in params {
        assert!(p.grad().is_some(), "parameter missing gradient");
    }
}
