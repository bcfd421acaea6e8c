//! Run configuration
//!
//! Loaded from YAML or assembled from CLI flags, then validated before a
//! solver is constructed.

use crate::error::{Error, Result};
use crate::model::SUPPORTED_SCALES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_lr() -> f32 {
    1e-3
}

fn default_epochs() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_scale() -> usize {
    2
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("result")
}

fn default_patch_size() -> usize {
    8
}

fn default_train_pairs() -> usize {
    16
}

fn default_eval_pairs() -> usize {
    4
}

/// Configuration for one training or evaluation run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Upscale factor (2, 4, or 8)
    #[serde(default = "default_scale")]
    pub upscale_factor: usize,

    /// Base learning rate
    #[serde(default = "default_lr")]
    pub lr: f32,

    /// Number of training epochs
    #[serde(default = "default_epochs")]
    pub n_epochs: usize,

    /// RNG seed for weight init and data generation
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Path to the teacher checkpoint
    #[serde(default)]
    pub teacher_checkpoint: Option<PathBuf>,

    /// Directory receiving the log, checkpoint, and exported images
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Low-resolution patch edge length
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,

    /// Number of training pairs per epoch
    #[serde(default = "default_train_pairs")]
    pub train_pairs: usize,

    /// Number of evaluation pairs
    #[serde(default = "default_eval_pairs")]
    pub eval_pairs: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            upscale_factor: default_scale(),
            lr: default_lr(),
            n_epochs: default_epochs(),
            seed: default_seed(),
            teacher_checkpoint: None,
            output_dir: default_output_dir(),
            patch_size: default_patch_size(),
            train_pairs: default_train_pairs(),
            eval_pairs: default_eval_pairs(),
        }
    }
}

impl SolverConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SCALES.contains(&self.upscale_factor) {
            return Err(Error::UnsupportedScale(self.upscale_factor));
        }
        if self.lr <= 0.0 || !self.lr.is_finite() {
            return Err(Error::Config(format!(
                "learning rate must be positive, got {}",
                self.lr
            )));
        }
        if self.n_epochs == 0 {
            return Err(Error::Config("n_epochs must be at least 1".into()));
        }
        if self.patch_size == 0 {
            return Err(Error::Config("patch_size must be at least 1".into()));
        }
        if self.eval_pairs == 0 {
            return Err(Error::Config("eval_pairs must be at least 1".into()));
        }
        Ok(())
    }

    /// Write the resolved configuration next to the run outputs
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Path of the training log inside the output directory
    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join("train_test.log")
    }

    /// Path of the resolved-config snapshot inside the output directory
    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join("config.json")
    }

    /// Path of the saved checkpoint inside the output directory
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join("my_model.safetensors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        SolverConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn test_rejects_bad_scale() {
        let config = SolverConfig {
            upscale_factor: 3,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::UnsupportedScale(3))
        ));
    }

    #[test]
    fn test_rejects_zero_epochs() {
        let config = SolverConfig {
            n_epochs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "upscale_factor: 4\nlr: 0.0005\nn_epochs: 20\nteacher_checkpoint: teacher.safetensors"
        )
        .expect("write yaml");

        let config = SolverConfig::from_yaml_file(file.path()).expect("parse");
        assert_eq!(config.upscale_factor, 4);
        assert_eq!(config.n_epochs, 20);
        assert_eq!(
            config.teacher_checkpoint,
            Some(PathBuf::from("teacher.safetensors"))
        );
        // Unset fields fall back to defaults
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_json_snapshot_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let config = SolverConfig {
            upscale_factor: 8,
            ..Default::default()
        };
        config.save_json(&path).expect("snapshot");

        let text = fs::read_to_string(&path).expect("readable");
        let loaded: SolverConfig = serde_json::from_str(&text).expect("parse");
        assert_eq!(loaded.upscale_factor, 8);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "upscale_factor: 2\nbogus_field: 1").expect("write yaml");
        assert!(matches!(
            SolverConfig::from_yaml_file(file.path()),
            Err(Error::Config(_))
        ));
    }
}
