//! Cairn Hash - Order-sensitive hashing primitives
//!
//! This crate provides the 64-bit combining hash used to key the build
//! cache, plus the two marker hash types the rest of the toolchain works
//! with: `FileContentHash` (what a file currently contains) and
//! `DeterminantHash` (what inputs produced an artifact).

pub mod code;
pub mod error;
pub mod markers;

pub use code::{combine, hash_strings, Bytes, HashCode, HashSource};
pub use error::HashError;
pub use markers::{DeterminantHash, FileContentHash};
