//! Error types for the common file helpers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for common helpers
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared file and checksum helpers
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("not a gzip artifact: {}", .0.display())]
    NotCompressed(PathBuf),

    #[error("no file name left after stripping .gz: {}", .0.display())]
    InvalidFileName(PathBuf),

    #[error("background task failed: {0}")]
    Task(String),
}
