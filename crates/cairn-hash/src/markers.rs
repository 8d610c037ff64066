//! Marker hash types keeping "file contents" and "cache determinants" apart

use std::fmt;
use std::fs;
use std::num::ParseIntError;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::code::{HashCode, HashSource};
use crate::error::HashError;

/// Hash of the literal bytes of a file on disk.
///
/// Distinct from [`DeterminantHash`] so "what the file currently contains"
/// can never stand in for "what inputs produced it". Conversion is one-way:
/// a `FileContentHash` may feed a determinant, never the reverse.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct FileContentHash(HashCode);

impl FileContentHash {
    /// Hash the contents of `path`.
    ///
    /// An empty file falls back to a hash of the path itself; a missing file
    /// is an error.
    pub fn from_path(path: &Path) -> Result<Self, HashError> {
        let bytes = fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                HashError::FileNotFound(path.to_path_buf())
            } else {
                HashError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        if bytes.is_empty() {
            Ok(Self(HashCode::of(path)))
        } else {
            Ok(Self(HashCode::new(xxh3_64(&bytes))))
        }
    }

    /// The underlying hash value
    pub const fn code(self) -> HashCode {
        self.0
    }
}

impl From<HashCode> for FileContentHash {
    fn from(code: HashCode) -> Self {
        Self(code)
    }
}

impl HashSource for FileContentHash {
    fn hash_code(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for FileContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FileContentHash {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<HashCode>().map(Self)
    }
}

/// Hash of every input that determines whether a cached artifact is reusable
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct DeterminantHash(HashCode);

impl DeterminantHash {
    /// Start a determinant from a single value
    pub fn of<T: HashSource + ?Sized>(value: &T) -> Self {
        Self(HashCode::of(value))
    }

    /// Fold another input into the determinant, left to right
    pub fn mix<T: HashSource + ?Sized>(&mut self, value: &T) {
        self.0.mix(value);
    }

    /// The underlying hash value
    pub const fn code(self) -> HashCode {
        self.0
    }
}

impl From<HashCode> for DeterminantHash {
    fn from(code: HashCode) -> Self {
        Self(code)
    }
}

impl From<FileContentHash> for DeterminantHash {
    fn from(hash: FileContentHash) -> Self {
        Self(hash.code())
    }
}

impl HashSource for DeterminantHash {
    fn hash_code(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for DeterminantHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeterminantHash {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<HashCode>().map(Self)
    }
}
