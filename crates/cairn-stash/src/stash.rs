//! The stash proper: archive and restore build artifacts by determinant

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cairn_hash::{DeterminantHash, FileContentHash};
use tracing::debug;

use crate::error::StashError;
use crate::manifest::{
    self, BuildHashMap, Manifest, ManifestEntry, ManifestKey,
};

/// Name of the manifest file inside the stash directory
pub const MANIFEST_FILE: &str = "manifest.txt";

/// Content-addressable artifact cache backed by a directory of blobs.
///
/// The manifest and the build-hash map are independently locked so readers
/// of one never contend with writers of the other. `stash` and `restore`
/// hold the manifest lock for their full duration: the read-modify-write of
/// blob-name allocation must be atomic per key.
pub struct Stash {
    dir: PathBuf,
    manifest: Mutex<Manifest>,
    build_hashes: Mutex<BuildHashMap>,
}

impl Stash {
    /// Open a stash rooted at `dir`, reloading any existing manifest.
    ///
    /// A malformed manifest is fatal; the stash does not attempt partial
    /// recovery.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StashError> {
        let dir = dir.into();
        let manifest_file = dir.join(MANIFEST_FILE);
        let manifest = if manifest_file.exists() {
            manifest::load_manifest(&manifest_file)?
        } else {
            Manifest::new()
        };
        debug!(dir = %dir.display(), entries = manifest.len(), "stash opened");
        Ok(Self {
            dir,
            manifest: Mutex::new(manifest),
            build_hashes: Mutex::new(BuildHashMap::new()),
        })
    }

    /// The stash directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last recorded build hash for `path`
    pub fn build_hash(&self, path: &Path) -> Result<FileContentHash, StashError> {
        let map = self.build_hashes.lock().unwrap();
        map.get(path)
            .copied()
            .ok_or_else(|| StashError::HashNotFound(path.to_path_buf()))
    }

    /// Record the build hash for `path`, replacing any previous value
    pub fn set_build_hash(&self, path: impl Into<PathBuf>, hash: FileContentHash) {
        let mut map = self.build_hashes.lock().unwrap();
        map.insert(path.into(), hash);
    }

    /// Replace the build-hash map with the contents of `file`
    pub fn load_build_hashes(&self, file: &Path) -> Result<(), StashError> {
        let loaded = manifest::load_build_hashes(file)?;
        let mut map = self.build_hashes.lock().unwrap();
        *map = loaded;
        Ok(())
    }

    /// Persist the build-hash map to `file`, rewriting it in full
    pub fn save_build_hashes(&self, file: &Path) -> Result<(), StashError> {
        let map = self.build_hashes.lock().unwrap();
        manifest::save_build_hashes(&map, file)
    }

    /// Archive the current bytes and modification time of `file` under
    /// `determinant`.
    ///
    /// The blob lands under a freshly allocated name inside the stash
    /// directory and the manifest is rewritten immediately, so the entry is
    /// durable without an explicit flush. Re-stashing an existing key
    /// overwrites the mapping; the old blob is not reused.
    pub fn stash(&self, file: &Path, determinant: DeterminantHash) -> Result<(), StashError> {
        let mut manifest = self.manifest.lock().unwrap();

        fs::create_dir_all(&self.dir)?;

        let mtime_secs = fs::metadata(file)?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        // First candidate name that does not yet exist on disk.
        let mut index = manifest.len();
        let blob = loop {
            let candidate = self.dir.join(format!("stash_{index}.st"));
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };

        fs::copy(file, &blob)?;
        debug!(
            file = %file.display(),
            determinant = %determinant,
            blob = %blob.display(),
            "artifact archived"
        );

        manifest.insert(
            ManifestKey {
                file: file.to_path_buf(),
                determinant,
            },
            ManifestEntry { blob, mtime_secs },
        );
        manifest::save_manifest(&manifest, &self.dir.join(MANIFEST_FILE))
    }

    /// Restore `file` from the archive recorded for (`file`, `determinant`).
    ///
    /// Returns false when no entry exists or the archived blob has gone
    /// missing. When the target already holds identical content only the
    /// modification time is fixed up; otherwise the blob is copied over any
    /// existing file. Returns true once the target's bytes and timestamp
    /// match the archive.
    pub fn restore(&self, file: &Path, determinant: DeterminantHash) -> Result<bool, StashError> {
        let manifest = self.manifest.lock().unwrap();

        let key = ManifestKey {
            file: file.to_path_buf(),
            determinant,
        };
        let Some(entry) = manifest.get(&key) else {
            debug!(file = %file.display(), determinant = %determinant, "stash miss");
            return Ok(false);
        };
        if !entry.blob.exists() {
            debug!(blob = %entry.blob.display(), "archived blob missing");
            return Ok(false);
        }

        let mtime = UNIX_EPOCH + Duration::from_secs(entry.mtime_secs);

        if file.exists() {
            let current = FileContentHash::from_path(file)?;
            let archived = FileContentHash::from_path(&entry.blob)?;
            if current == archived {
                set_mtime(file, mtime)?;
                debug!(file = %file.display(), "stash hit, content already in place");
                return Ok(true);
            }
            fs::remove_file(file)?;
        }

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&entry.blob, file)?;
        set_mtime(file, mtime)?;
        debug!(file = %file.display(), determinant = %determinant, "stash hit");
        Ok(true)
    }
}

fn set_mtime(file: &Path, mtime: SystemTime) -> Result<(), StashError> {
    let handle = fs::File::options().write(true).open(file)?;
    handle.set_modified(mtime)?;
    Ok(())
}
