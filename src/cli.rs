//! Command-line interface

use crate::config::SolverConfig;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ampliar",
    about = "Super-resolution distillation with 8-bit quantization",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Distill a quantized student from a teacher checkpoint
    Train(RunArgs),
    /// Evaluate a saved student checkpoint and export image pairs
    Eval(EvalArgs),
    /// Train a float teacher from scratch and save its checkpoint
    InitTeacher(TeacherArgs),
}

/// Configuration source plus flag overrides, shared by all subcommands
#[derive(Args)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Upscale factor (2, 4, or 8)
    #[arg(long)]
    pub scale: Option<usize>,

    /// Base learning rate
    #[arg(long)]
    pub lr: Option<f32>,

    /// Number of training epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// RNG seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Teacher checkpoint path
    #[arg(long)]
    pub teacher: Option<PathBuf>,

    /// Output directory for logs, checkpoints, and images
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Load the YAML config (or defaults) and apply flag overrides
    pub fn resolve(&self) -> Result<SolverConfig> {
        let mut config = match &self.config {
            Some(path) => SolverConfig::from_yaml_file(path)?,
            None => SolverConfig::default(),
        };
        if let Some(scale) = self.scale {
            config.upscale_factor = scale;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(epochs) = self.epochs {
            config.n_epochs = epochs;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(teacher) = &self.teacher {
            config.teacher_checkpoint = Some(teacher.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
pub struct EvalArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Student checkpoint to evaluate
    #[arg(long)]
    pub checkpoint: PathBuf,
}

#[derive(Args)]
pub struct TeacherArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Where to write the teacher checkpoint
    /// (defaults to <output_dir>/teacher.safetensors)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_apply() {
        let cli = Cli::parse_from([
            "ampliar",
            "train",
            "--scale",
            "4",
            "--lr",
            "0.0005",
            "--epochs",
            "7",
            "--teacher",
            "t.safetensors",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train subcommand");
        };
        let config = args.resolve().expect("valid config");
        assert_eq!(config.upscale_factor, 4);
        assert_eq!(config.lr, 0.0005);
        assert_eq!(config.n_epochs, 7);
        assert_eq!(
            config.teacher_checkpoint,
            Some(PathBuf::from("t.safetensors"))
        );
    }

    #[test]
    fn test_invalid_scale_rejected_at_resolve() {
        let cli = Cli::parse_from(["ampliar", "train", "--scale", "3"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train subcommand");
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_eval_requires_checkpoint() {
        assert!(Cli::try_parse_from(["ampliar", "eval"]).is_err());
    }
}
