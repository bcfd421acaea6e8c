//! Ampliar: super-resolution knowledge distillation with 8-bit quantization
//!
//! The crate trains a quantized student network to reproduce a floating-point
//! teacher for image super-resolution. The model is a closed layer tree
//! ([`nn::Layer`]); the quantization pass ([`quant::quantize_model`]) rewrites
//! that tree structurally, copying parameters bit-exact into fake-quantized
//! layers. The [`solver::Solver`] drives teacher evaluation, the distillation
//! epochs with PSNR/SSIM tracking, JPEG export at the final epoch, and the
//! SafeTensors checkpoint save.
//!
//! ```no_run
//! use ampliar::config::SolverConfig;
//! use ampliar::logger::RunLogger;
//! use ampliar::solver::Solver;
//!
//! # fn main() -> ampliar::error::Result<()> {
//! let config = SolverConfig {
//!     upscale_factor: 2,
//!     n_epochs: 10,
//!     teacher_checkpoint: Some("result/teacher.safetensors".into()),
//!     ..Default::default()
//! };
//! let logger = RunLogger::with_file(&config.log_path())?;
//! Solver::new(config, logger)?.run()
//! # }
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod logger;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod nn;
pub mod optim;
pub mod quant;
pub mod solver;
pub mod tensor;

pub use config::SolverConfig;
pub use error::{Error, Result};
pub use solver::Solver;
pub use tensor::Tensor;
