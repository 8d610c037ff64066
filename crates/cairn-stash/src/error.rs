//! Error types for the stash

use std::path::PathBuf;

use cairn_hash::HashError;
use thiserror::Error;

/// Errors raised by stash operations
#[derive(Debug, Error)]
pub enum StashError {
    /// No build hash has been recorded for the given path
    #[error("no build hash recorded for {0}")]
    HashNotFound(PathBuf),

    /// A persisted map file contains a line that cannot be parsed.
    /// Fatal at load time; no partial recovery is attempted.
    #[error("malformed entry at {file}:{line}")]
    Malformed { file: PathBuf, line: usize },

    /// Hashing a file failed
    #[error(transparent)]
    Hash(#[from] HashError),

    /// An underlying filesystem operation failed
    #[error("stash io error: {0}")]
    Io(#[from] std::io::Error),
}
