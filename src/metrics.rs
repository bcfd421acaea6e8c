//! Image quality metrics
//!
//! PSNR and SSIM over `[0, 1]` images. SSIM uses the global-statistics form
//! (one mean/variance/covariance per image pair) rather than a sliding
//! window.

use crate::tensor::Tensor;

/// Smallest MSE fed into the PSNR log, capping PSNR at 100 dB
const MSE_FLOOR: f32 = 1e-10;

/// Peak signal-to-noise ratio in dB for unit-range images
pub fn psnr(pred: &Tensor, target: &Tensor) -> f32 {
    assert_eq!(pred.shape(), target.shape(), "image shapes must match");
    let n = pred.len() as f32;
    let mse = pred
        .data()
        .iter()
        .zip(target.data().iter())
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum::<f32>()
        / n;
    10.0 * (1.0 / mse.max(MSE_FLOOR)).log10()
}

/// Global-statistics structural similarity for unit-range images
pub fn ssim(pred: &Tensor, target: &Tensor) -> f32 {
    assert_eq!(pred.shape(), target.shape(), "image shapes must match");
    let n = pred.len() as f32;
    let c1 = 0.01f32 * 0.01;
    let c2 = 0.03f32 * 0.03;

    let mean_p = pred.data().iter().sum::<f32>() / n;
    let mean_t = target.data().iter().sum::<f32>() / n;

    let mut var_p = 0.0f32;
    let mut var_t = 0.0f32;
    let mut cov = 0.0f32;
    for (&p, &t) in pred.data().iter().zip(target.data().iter()) {
        var_p += (p - mean_p) * (p - mean_p);
        var_t += (t - mean_t) * (t - mean_t);
        cov += (p - mean_p) * (t - mean_t);
    }
    var_p /= n;
    var_t /= n;
    cov /= n;

    ((2.0 * mean_p * mean_t + c1) * (2.0 * cov + c2))
        / ((mean_p * mean_p + mean_t * mean_t + c1) * (var_p + var_t + c2))
}

/// Running averages accumulated over an evaluation epoch
#[derive(Default, Clone, Debug)]
pub struct EpochStats {
    loss_sum: f64,
    psnr_sum: f64,
    ssim_sum: f64,
    count: usize,
}

impl EpochStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, loss: f32, psnr: f32, ssim: f32) {
        self.loss_sum += loss as f64;
        self.psnr_sum += psnr as f64;
        self.ssim_sum += ssim as f64;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn avg_loss(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.loss_sum / self.count as f64) as f32
        }
    }

    pub fn avg_psnr(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.psnr_sum / self.count as f64) as f32
        }
    }

    pub fn avg_ssim(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.ssim_sum / self.count as f64) as f32
        }
    }
}
