//! On-disk persistence for the stash manifest and the build-hash map
//!
//! Both files are line-oriented, comma-separated UTF-8 text and are fully
//! rewritten on every save:
//!
//! - manifest: `<file-path>,<determinant-decimal>,<blob-path>,<mtime-epoch-secs>`
//! - build-hash map: `<file-path>,<hash-decimal>`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cairn_hash::{DeterminantHash, FileContentHash};

use crate::error::StashError;

/// Key of one archived artifact: which file, produced from which inputs
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ManifestKey {
    /// Target file path the artifact was archived from
    pub file: PathBuf,
    /// Determinant hash of the inputs that produced it
    pub determinant: DeterminantHash,
}

/// Value of one archived artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path of the archived blob inside the stash directory
    pub blob: PathBuf,
    /// Modification time captured when the artifact was archived
    pub mtime_secs: u64,
}

/// The full (path, determinant) -> archived blob mapping
pub type Manifest = BTreeMap<ManifestKey, ManifestEntry>;

/// The independent path -> last-known build hash mapping
pub type BuildHashMap = BTreeMap<PathBuf, FileContentHash>;

pub fn load_manifest(file: &Path) -> Result<Manifest, StashError> {
    let contents = fs::read_to_string(file)?;
    let mut manifest = Manifest::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let malformed = || StashError::Malformed {
            file: file.to_path_buf(),
            line: idx + 1,
        };
        let fields: Vec<&str> = line.split(',').collect();
        let &[path, code, blob, mtime] = fields.as_slice() else {
            return Err(malformed());
        };
        let key = ManifestKey {
            file: PathBuf::from(path),
            determinant: code.parse().map_err(|_| malformed())?,
        };
        let entry = ManifestEntry {
            blob: PathBuf::from(blob),
            mtime_secs: mtime.parse().map_err(|_| malformed())?,
        };
        manifest.insert(key, entry);
    }
    Ok(manifest)
}

pub fn save_manifest(manifest: &Manifest, file: &Path) -> Result<(), StashError> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for (key, entry) in manifest {
        out.push_str(&format!(
            "{},{},{},{}\n",
            key.file.display(),
            key.determinant,
            entry.blob.display(),
            entry.mtime_secs,
        ));
    }
    fs::write(file, out)?;
    Ok(())
}

pub fn load_build_hashes(file: &Path) -> Result<BuildHashMap, StashError> {
    let contents = fs::read_to_string(file)?;
    let mut map = BuildHashMap::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let malformed = || StashError::Malformed {
            file: file.to_path_buf(),
            line: idx + 1,
        };
        let fields: Vec<&str> = line.split(',').collect();
        let &[path, code] = fields.as_slice() else {
            return Err(malformed());
        };
        map.insert(
            PathBuf::from(path),
            code.parse().map_err(|_| malformed())?,
        );
    }
    Ok(map)
}

pub fn save_build_hashes(map: &BuildHashMap, file: &Path) -> Result<(), StashError> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for (path, code) in map {
        out.push_str(&format!("{},{}\n", path.display(), code));
    }
    fs::write(file, out)?;
    Ok(())
}
