//! Synthetic training data
//!
//! Generates matched low-resolution / high-resolution image pairs: a smooth
//! random high-resolution scene is rendered from low-frequency components,
//! and the low-resolution input is its average-pooled reduction. Values are
//! kept in `[0, 1]`.

use crate::model::CHANNELS;
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// One low-res input with its high-res ground truth
pub struct Batch {
    pub input: Tensor,
    pub target: Tensor,
}

fn smooth_scene(rng: &mut StdRng, h: usize, w: usize) -> Vec<f32> {
    // Sum of a few random low-frequency waves per channel, mapped to [0, 1]
    let mut out = vec![0.0f32; CHANNELS * h * w];
    for c in 0..CHANNELS {
        let fx = rng.random_range(0.5..2.0);
        let fy = rng.random_range(0.5..2.0);
        let phase = rng.random_range(0.0..2.0 * PI);
        let amp = rng.random_range(0.2..0.5);
        for y in 0..h {
            for x in 0..w {
                let v = amp
                    * (2.0 * PI * (fx * x as f32 / w as f32 + fy * y as f32 / h as f32) + phase)
                        .sin()
                    + 0.5;
                out[(c * h + y) * w + x] = v.clamp(0.0, 1.0);
            }
        }
    }
    out
}

fn average_pool(hr: &[f32], h: usize, w: usize, scale: usize) -> Vec<f32> {
    let (lh, lw) = (h / scale, w / scale);
    let mut out = vec![0.0f32; CHANNELS * lh * lw];
    let norm = (scale * scale) as f32;
    for c in 0..CHANNELS {
        for y in 0..lh {
            for x in 0..lw {
                let mut acc = 0.0;
                for dy in 0..scale {
                    for dx in 0..scale {
                        acc += hr[(c * h + y * scale + dy) * w + x * scale + dx];
                    }
                }
                out[(c * lh + y) * lw + x] = acc / norm;
            }
        }
    }
    out
}

/// Deterministic synthetic dataset of `count` pairs
///
/// Inputs are `[3, size, size]`, targets `[3, size*scale, size*scale]`.
pub fn synthetic_pairs(seed: u64, count: usize, size: usize, scale: usize) -> Vec<Batch> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (hh, hw) = (size * scale, size * scale);
    (0..count)
        .map(|_| {
            let hr = smooth_scene(&mut rng, hh, hw);
            let lr = average_pool(&hr, hh, hw, scale);
            Batch {
                input: Tensor::from_shape_vec(vec![CHANNELS, size, size], lr, false),
                target: Tensor::from_shape_vec(vec![CHANNELS, hh, hw], hr, false),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let pairs = synthetic_pairs(0, 2, 4, 2);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].input.shape(), &[3, 4, 4]);
        assert_eq!(pairs[0].target.shape(), &[3, 8, 8]);
    }

    #[test]
    fn test_values_in_unit_range() {
        for batch in synthetic_pairs(1, 3, 4, 4) {
            assert!(batch.input.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert!(batch.target.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = synthetic_pairs(42, 1, 4, 2);
        let b = synthetic_pairs(42, 1, 4, 2);
        assert_eq!(a[0].target.data(), b[0].target.data());
    }

    #[test]
    fn test_input_is_pooled_target() {
        let pairs = synthetic_pairs(7, 1, 2, 2);
        let hr = pairs[0].target.as_slice();
        let expected = (hr[0] + hr[1] + hr[4] + hr[5]) / 4.0;
        assert!((pairs[0].input.data()[0] - expected).abs() < 1e-6);
    }
}
