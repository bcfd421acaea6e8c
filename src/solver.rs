//! Training and evaluation driver
//!
//! A run proceeds teacher evaluation → (train epoch → eval epoch)* →
//! checkpoint save. The student is the quantized rewrite of the teacher's
//! architecture, seeded with the teacher's weights, and trains against the
//! ground-truth targets with the composite pixel + gradient-similarity loss.
//! The teacher is evaluated once up front as the full-precision reference.
//! Evaluation measures PSNR/SSIM against ground truth; the final epoch
//! additionally exports prediction/original JPEG pairs.

use crate::checkpoint::{load_model, save_model};
use crate::config::SolverConfig;
use crate::data::{synthetic_pairs, Batch};
use crate::error::{Error, Result};
use crate::logger::RunLogger;
use crate::loss::{LossFn, MixGeLoss, MseLoss};
use crate::metrics::{psnr, ssim, EpochStats};
use crate::model::{build_model, upscale_net, BuildArtifacts};
use crate::nn::Layer;
use crate::optim::{Adam, LRScheduler, MultiStepLR, Optimizer};
use crate::quant::{quantize_model, QuantSpec};
use crate::tensor::Tensor;
use image::{Rgb, RgbImage};
use std::path::Path;

pub struct Solver {
    config: SolverConfig,
    student: Layer,
    teacher: Layer,
    criterion: MixGeLoss,
    pixel_loss: MseLoss,
    optimizer: Adam,
    scheduler: MultiStepLR,
    logger: RunLogger,
    train_set: Vec<Batch>,
    eval_set: Vec<Batch>,
}

impl Solver {
    /// Build a distillation run from a validated configuration
    ///
    /// Requires `teacher_checkpoint`; the student starts as the quantized
    /// copy of the teacher.
    pub fn new(config: SolverConfig, logger: RunLogger) -> Result<Self> {
        let teacher_path = config
            .teacher_checkpoint
            .clone()
            .ok_or_else(|| Error::Config("teacher_checkpoint is required for training".into()))?;
        Self::build(config, logger, Some(&teacher_path))
    }

    /// Evaluation-only construction: no teacher weights are loaded
    ///
    /// Use with [`evaluate_only`](Self::evaluate_only); the student's
    /// parameters come from the checkpoint passed there.
    pub fn for_eval(config: SolverConfig, logger: RunLogger) -> Result<Self> {
        Self::build(config, logger, None)
    }

    fn build(
        config: SolverConfig,
        logger: RunLogger,
        teacher_path: Option<&Path>,
    ) -> Result<Self> {
        config.validate()?;

        let mut teacher = upscale_net(config.upscale_factor)?;
        if let Some(path) = teacher_path {
            load_model(&mut teacher, path)?;
        }
        teacher.set_training(false);

        let BuildArtifacts {
            model: mut student_float,
            criterion,
            pixel_loss,
            optimizer,
            scheduler,
            ..
        } = build_model(config.upscale_factor, config.lr, config.seed)?;
        if let Some(path) = teacher_path {
            load_model(&mut student_float, path)?;
        }
        let student = quantize_model(student_float, &QuantSpec::default());

        let train_set = synthetic_pairs(
            config.seed,
            config.train_pairs,
            config.patch_size,
            config.upscale_factor,
        );
        let eval_set = synthetic_pairs(
            config.seed.wrapping_add(1),
            config.eval_pairs,
            config.patch_size,
            config.upscale_factor,
        );

        let mut solver = Self {
            config,
            student,
            teacher,
            criterion,
            pixel_loss,
            optimizer,
            scheduler,
            logger,
            train_set,
            eval_set,
        };
        solver.log_model();
        Ok(solver)
    }

    fn log_model(&mut self) {
        let count = self.student.param_count();
        self.logger.info(&format!(
            "student ({} parameters, x{}):",
            count, self.config.upscale_factor
        ));
        for line in self.student.summary().lines() {
            self.logger.info(line);
        }
    }

    /// Run the full distillation loop and save the final checkpoint
    pub fn run(&mut self) -> Result<()> {
        self.config.save_json(&self.config.snapshot_path())?;

        let teacher_stats =
            Self::eval_model(&mut self.teacher, &self.eval_set, &self.pixel_loss);
        self.logger.info(&format!(
            "teacher: psnr {:.2} dB ssim {:.4}",
            teacher_stats.avg_psnr(),
            teacher_stats.avg_ssim()
        ));

        let n_epochs = self.config.n_epochs;
        for epoch in 1..=n_epochs {
            let train_loss = self.train_epoch();
            let final_epoch = epoch == n_epochs;

            self.student.set_training(false);
            let stats = Self::eval_model(&mut self.student, &self.eval_set, &self.pixel_loss);
            if final_epoch {
                self.export_images()?;
            }
            self.student.set_training(true);

            self.logger.info(&format!(
                "epoch {}/{}: train_loss {:.6} lr {:.6} | eval: loss {:.6} psnr {:.2} dB ssim {:.4}",
                epoch,
                n_epochs,
                train_loss,
                self.optimizer.lr(),
                stats.avg_loss(),
                stats.avg_psnr(),
                stats.avg_ssim()
            ));

            self.scheduler.step();
            self.optimizer.set_lr(self.scheduler.get_lr());
        }

        let path = self.config.checkpoint_path();
        save_model(&self.student, &path)?;
        self.logger
            .info(&format!("saved checkpoint to {}", path.display()));
        Ok(())
    }

    fn train_epoch(&mut self) -> f32 {
        let Self {
            student,
            train_set,
            criterion,
            optimizer,
            ..
        } = self;

        let mut total = 0.0f32;
        for batch in train_set.iter() {
            student.zero_grad();
            let pred = student.forward(&batch.input);
            let loss = criterion.forward(&pred, &batch.target);
            let grad = criterion.grad(&pred, &batch.target);
            let _ = student.backward(&grad);

            let mut params = Vec::new();
            student.collect_params_mut(&mut params);
            optimizer.step(&mut params);

            total += loss;
        }
        total / train_set.len().max(1) as f32
    }

    fn eval_model(model: &mut Layer, eval_set: &[Batch], pixel_loss: &MseLoss) -> EpochStats {
        let mut stats = EpochStats::new();
        for batch in eval_set {
            let pred = model.forward(&batch.input);
            stats.record(
                pixel_loss.forward(&pred, &batch.target),
                psnr(&pred, &batch.target),
                ssim(&pred, &batch.target),
            );
        }
        stats
    }

    fn export_images(&mut self) -> Result<()> {
        let pred_dir = self.config.output_dir.join("prediction");
        let orig_dir = self.config.output_dir.join("original");
        std::fs::create_dir_all(&pred_dir)?;
        std::fs::create_dir_all(&orig_dir)?;

        let Self {
            student, eval_set, ..
        } = self;
        for (i, batch) in eval_set.iter().enumerate() {
            let pred = student.forward(&batch.input);
            write_jpeg(&pred, &pred_dir.join(format!("prediction_{i}.jpg")))?;
            write_jpeg(&batch.target, &orig_dir.join(format!("original_{i}.jpg")))?;
        }
        Ok(())
    }

    /// Evaluate a saved student checkpoint, exporting image pairs
    pub fn evaluate_only(&mut self, checkpoint: &Path) -> Result<EpochStats> {
        load_model(&mut self.student, checkpoint)?;
        self.student.set_training(false);
        let stats = Self::eval_model(&mut self.student, &self.eval_set, &self.pixel_loss);
        self.export_images()?;
        self.student.set_training(true);
        self.logger.info(&format!(
            "eval: loss {:.6} psnr {:.2} dB ssim {:.4}",
            stats.avg_loss(),
            stats.avg_psnr(),
            stats.avg_ssim()
        ));
        Ok(stats)
    }
}

/// Supervised training of a float teacher on ground truth, then save
///
/// Provides a teacher checkpoint when none exists yet; the distillation run
/// proper loads the result through `teacher_checkpoint`.
pub fn train_teacher(config: &SolverConfig, logger: &mut RunLogger, out: &Path) -> Result<()> {
    config.validate()?;
    let BuildArtifacts {
        mut model,
        criterion,
        mut optimizer,
        mut scheduler,
        ..
    } = build_model(config.upscale_factor, config.lr, config.seed)?;
    let train_set = synthetic_pairs(
        config.seed,
        config.train_pairs,
        config.patch_size,
        config.upscale_factor,
    );

    for epoch in 1..=config.n_epochs {
        let mut total = 0.0f32;
        for batch in &train_set {
            model.zero_grad();
            let pred = model.forward(&batch.input);
            total += criterion.forward(&pred, &batch.target);
            let grad = criterion.grad(&pred, &batch.target);
            let _ = model.backward(&grad);
            let mut params = Vec::new();
            model.collect_params_mut(&mut params);
            optimizer.step(&mut params);
        }
        logger.info(&format!(
            "teacher epoch {}/{}: loss {:.6}",
            epoch,
            config.n_epochs,
            total / train_set.len().max(1) as f32
        ));
        scheduler.step();
        optimizer.set_lr(scheduler.get_lr());
    }

    save_model(&model, out)?;
    logger.info(&format!("saved teacher to {}", out.display()));
    Ok(())
}

fn write_jpeg(t: &Tensor, path: &Path) -> Result<()> {
    let shape = t.shape();
    assert_eq!(shape.len(), 3, "expected [c, h, w] image, got {shape:?}");
    assert_eq!(shape[0], 3, "JPEG export needs 3 channels");
    let (h, w) = (shape[1], shape[2]);
    let data = t.as_slice();

    let mut img = RgbImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let px = |c: usize| (data[(c * h + y) * w + x].clamp(0.0, 1.0) * 255.0).round() as u8;
            img.put_pixel(x as u32, y as u32, Rgb([px(0), px(1), px(2)]));
        }
    }
    img.save(path)
        .map_err(|e| Error::ImageExport(format!("{}: {e}", path.display())))
}
