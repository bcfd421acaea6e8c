//! End-to-end distillation run on a tiny configuration

use ampliar::config::SolverConfig;
use ampliar::logger::RunLogger;
use ampliar::solver::{train_teacher, Solver};
use std::path::PathBuf;
use tempfile::tempdir;

fn tiny_config(output_dir: PathBuf) -> SolverConfig {
    SolverConfig {
        upscale_factor: 2,
        lr: 1e-3,
        n_epochs: 1,
        seed: 42,
        teacher_checkpoint: None,
        output_dir,
        patch_size: 4,
        train_pairs: 4,
        eval_pairs: 2,
    }
}

#[test]
fn full_run_produces_checkpoint_log_and_images() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().to_path_buf();

    // Bootstrap a teacher first
    let teacher_path = out.join("teacher.safetensors");
    let mut config = tiny_config(out.clone());
    let mut logger = RunLogger::with_file(&config.log_path()).expect("logger");
    train_teacher(&config, &mut logger, &teacher_path).expect("teacher training");
    assert!(teacher_path.exists());

    // Distill the quantized student from it
    config.teacher_checkpoint = Some(teacher_path);
    let logger = RunLogger::with_file(&config.log_path()).expect("logger");
    let mut solver = Solver::new(config.clone(), logger).expect("solver");
    solver.run().expect("training run");

    assert!(config.checkpoint_path().exists(), "student checkpoint");
    assert!(config.log_path().exists(), "training log");
    assert!(config.snapshot_path().exists(), "config snapshot");
    for i in 0..config.eval_pairs {
        assert!(out
            .join("prediction")
            .join(format!("prediction_{i}.jpg"))
            .exists());
        assert!(out
            .join("original")
            .join(format!("original_{i}.jpg"))
            .exists());
    }

    let log = std::fs::read_to_string(config.log_path()).expect("log readable");
    assert!(log.contains("teacher:"), "teacher eval logged");
    assert!(log.contains("epoch 1/1"), "epoch line logged");
    assert!(log.contains("saved checkpoint"), "save logged");
}

#[test]
fn saved_student_evaluates_standalone() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().to_path_buf();

    let teacher_path = out.join("teacher.safetensors");
    let mut config = tiny_config(out);
    let mut logger = RunLogger::stdout_only();
    train_teacher(&config, &mut logger, &teacher_path).expect("teacher training");

    config.teacher_checkpoint = Some(teacher_path);
    let mut solver =
        Solver::new(config.clone(), RunLogger::stdout_only()).expect("solver");
    solver.run().expect("training run");

    let mut eval_solver =
        Solver::for_eval(config.clone(), RunLogger::stdout_only()).expect("eval solver");
    let stats = eval_solver
        .evaluate_only(&config.checkpoint_path())
        .expect("evaluation");

    assert_eq!(stats.count(), config.eval_pairs);
    assert!(stats.avg_psnr().is_finite());
    assert!(stats.avg_ssim().is_finite());
    assert!(stats.avg_ssim() <= 1.0 + 1e-5);
}

#[test]
fn missing_teacher_checkpoint_fails_cleanly() {
    let dir = tempdir().expect("tempdir");
    let mut config = tiny_config(dir.path().to_path_buf());
    config.teacher_checkpoint = Some(dir.path().join("does_not_exist.safetensors"));
    assert!(Solver::new(config, RunLogger::stdout_only()).is_err());
}
