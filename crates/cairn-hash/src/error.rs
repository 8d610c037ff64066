//! Error types for hashing operations

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while hashing file contents
#[derive(Debug, Error)]
pub enum HashError {
    /// The file to hash does not exist
    #[error("file does not exist: {0}")]
    FileNotFound(PathBuf),

    /// The file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
