/*!
 * Recycle-bin staging (component C helper)
 *
 * Grounded on `zen/recycler.cpp`: rather than calling a native shell API,
 * this crate stages recycled items in a `.dsync_recycle_bin.tmp` directory
 * created next to the item being removed (same volume, so the move is a
 * plain rename), batching multiple deletions from one sync run into the
 * same staging directory the way the original batches moves into a single
 * `RecycleBin.ffs_tmp` per target volume before handing them to the shell
 * recycler in one call.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::fsops::primitives;

pub(crate) const STAGING_DIR_NAME: &str = ".dsync_recycle_bin.tmp";

/// One staging directory per volume root, keyed by that root's path.
/// `zen/recycler.cpp` keys its batch by target volume for the same reason:
/// a rename-based stage can't cross volumes.
#[derive(Default)]
pub struct RecyclerStaging {
    roots: HashMap<PathBuf, PathBuf>,
}

impl RecyclerStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `path` into the staging directory for its parent, creating the
    /// staging directory on first use under that parent.
    pub fn stage(&mut self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let staging_dir = self.staging_dir_for(&parent)?;
        let name = path.file_name().unwrap_or_default();
        let dest = staging_dir.join(name);
        let dest = unique_name(&dest);
        primitives::rename(path, &dest)
    }

    fn staging_dir_for(&mut self, parent: &Path) -> Result<PathBuf> {
        if let Some(dir) = self.roots.get(parent) {
            return Ok(dir.clone());
        }
        let dir = parent.join(STAGING_DIR_NAME);
        primitives::make_directory(&dir)?;
        self.roots.insert(parent.to_path_buf(), dir.clone());
        Ok(dir)
    }

    /// Best-effort cleanup of every staging directory created this run.
    /// Called from `DeletionHandler`'s `Drop` impl; failures are logged,
    /// never propagated, since this runs during unwind as well as normal
    /// drop.
    pub fn try_cleanup(&mut self) {
        for (_, dir) in self.roots.drain() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(path = ?dir, error = %e, "failed to clean up recycler staging directory");
            }
        }
    }
}

fn unique_name(dest: &Path) -> PathBuf {
    if !primitives::exists(dest) {
        return dest.to_path_buf();
    }
    for n in 1..1000 {
        let mut name = dest.file_name().unwrap_or_default().to_os_string();
        name.push(format!("_{}", n));
        let candidate = dest.with_file_name(name);
        if !primitives::exists(&candidate) {
            return candidate;
        }
    }
    dest.to_path_buf()
}

impl Drop for RecyclerStaging {
    fn drop(&mut self) {
        self.try_cleanup();
    }
}
