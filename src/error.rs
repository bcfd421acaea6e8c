//! Error types for Ampliar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported scale factor: {0} (expected 2, 4, or 8)")]
    UnsupportedScale(usize),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image export error: {0}")]
    ImageExport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
