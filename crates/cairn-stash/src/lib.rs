//! Cairn Stash - Content-addressable artifact cache
//!
//! Maps (target path, determinant hash) pairs to archived copies of build
//! outputs so identical future work can be skipped, and keeps a separate
//! path -> build-hash map callers use to detect changed inputs. Both maps
//! persist as line-oriented text files inside the stash directory.

pub mod error;
pub mod manifest;
pub mod stash;

pub use error::StashError;
pub use stash::{Stash, MANIFEST_FILE};
