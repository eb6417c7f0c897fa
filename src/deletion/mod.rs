/*!
 * Deletion handling (component C)
 *
 * A `DeletionHandler` is constructed once per folder side per sync run and
 * wraps the configured tri-state policy (permanent / recycler / versioning)
 * behind a single `remove_file`/`remove_dir` surface, so the orchestrator's
 * pass-1 delete step doesn't need to branch on policy itself. The
 * versioner is constructed lazily -- only the first versioned delete pays
 * for it -- mirroring the original's lazy `FileVersioner` construction.
 */

pub mod recycler;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::config::{DeletionPolicy, VersioningStyle};
use crate::error::{Result, SyncError};
use crate::fsops::primitives;
use crate::versioner::FileVersioner;

use recycler::RecyclerStaging;

/// Engine-private scratch suffix. A leftover file or directory ending in
/// this suffix is always permanently removed regardless of the configured
/// policy — it's an engine artifact, not user data, so it never belongs in
/// the recycle bin or a versioning folder.
const SCRATCH_SUFFIX: &str = ".dsync_tmp";

fn is_scratch_leftover(relative_path: &Path) -> bool {
    relative_path
        .as_os_str()
        .to_str()
        .is_some_and(|s| s.ends_with(SCRATCH_SUFFIX))
}

pub struct DeletionHandler {
    policy: DeletionPolicy,
    versioning_folder: Option<PathBuf>,
    versioning_style: VersioningStyle,
    versioner: Option<FileVersioner>,
    recycler: RecyclerStaging,
}

impl DeletionHandler {
    pub fn new(
        policy: DeletionPolicy,
        versioning_folder: Option<PathBuf>,
        versioning_style: VersioningStyle,
    ) -> Self {
        Self {
            policy,
            versioning_folder,
            versioning_style,
            versioner: None,
            recycler: RecyclerStaging::new(),
        }
    }

    fn versioner(&mut self) -> Result<&FileVersioner> {
        if self.versioner.is_none() {
            let folder = self
                .versioning_folder
                .clone()
                .ok_or(SyncError::VersioningNotConfigured)?;
            self.versioner = Some(FileVersioner::new(folder, self.versioning_style));
        }
        Ok(self.versioner.as_ref().expect("just constructed"))
    }

    /// Remove a single file per the configured policy. `relative_path` is
    /// the path relative to the synced folder root, used to place the item
    /// correctly inside the versioning folder.
    pub fn remove_file(&mut self, path: &Path, relative_path: &Path) -> Result<()> {
        if is_scratch_leftover(relative_path) {
            return primitives::remove_file(path);
        }
        match self.policy {
            DeletionPolicy::Permanent => primitives::remove_file(path),
            DeletionPolicy::Recycler => match self.recycler.stage(path) {
                Ok(()) => Ok(()),
                Err(SyncError::DifferentVolume { .. }) => {
                    warn!(?path, "recycler staging unavailable across volumes, deleting permanently");
                    primitives::remove_file(path)
                }
                Err(e) => Err(e),
            },
            DeletionPolicy::Versioning => {
                let now = Utc::now();
                self.versioner()?.revision_file(path, relative_path, now)
            }
        }
    }

    /// Remove an (already-empty, contents already processed) directory
    /// shell per the configured policy.
    pub fn remove_dir(&mut self, path: &Path, relative_path: &Path) -> Result<()> {
        if is_scratch_leftover(relative_path) {
            return primitives::remove_directory_recursive(path);
        }
        match self.policy {
            DeletionPolicy::Permanent => primitives::remove_directory_plain(path),
            DeletionPolicy::Recycler => match self.recycler.stage(path) {
                Ok(()) => Ok(()),
                Err(SyncError::DifferentVolume { .. }) => {
                    warn!(?path, "recycler staging unavailable across volumes, deleting permanently");
                    primitives::remove_directory_recursive(path)
                }
                Err(e) => Err(e),
            },
            DeletionPolicy::Versioning => self.versioner()?.revision_dir(path, relative_path),
        }
    }

    /// Finalize any batched recycler staging. Safe to call multiple times.
    pub fn try_cleanup(&mut self) {
        self.recycler.try_cleanup();
    }
}

impl Drop for DeletionHandler {
    fn drop(&mut self) {
        self.try_cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn permanent_policy_deletes_immediately() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut handler = DeletionHandler::new(DeletionPolicy::Permanent, None, VersioningStyle::Replace);
        handler.remove_file(&file, Path::new("a.txt")).unwrap();

        assert!(!file.exists());
    }

    #[test]
    fn recycler_policy_stages_rather_than_deletes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut handler = DeletionHandler::new(DeletionPolicy::Recycler, None, VersioningStyle::Replace);
        handler.remove_file(&file, Path::new("a.txt")).unwrap();

        assert!(!file.exists());
        assert!(dir
            .path()
            .join(recycler::STAGING_DIR_NAME)
            .join("a.txt")
            .exists());
    }

    #[test]
    fn scratch_leftover_is_always_permanent_even_under_versioning() {
        let dir = tempdir().unwrap();
        let versions = dir.path().join("versions");
        let leftover = dir.path().join("trg.bin.dsync_tmp");
        std::fs::write(&leftover, b"x").unwrap();

        let mut handler = DeletionHandler::new(
            DeletionPolicy::Versioning,
            Some(versions.clone()),
            VersioningStyle::Replace,
        );
        handler
            .remove_file(&leftover, Path::new("trg.bin.dsync_tmp"))
            .unwrap();

        assert!(!leftover.exists());
        assert!(!versions.join("trg.bin.dsync_tmp").exists());
    }

    #[test]
    fn versioning_without_folder_errors() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut handler = DeletionHandler::new(DeletionPolicy::Versioning, None, VersioningStyle::Replace);
        let err = handler.remove_file(&file, Path::new("a.txt")).unwrap_err();
        assert!(matches!(err, SyncError::VersioningNotConfigured));
    }

    #[test]
    fn versioning_with_folder_relocates_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        let versions = dir.path().join("versions");

        let mut handler = DeletionHandler::new(
            DeletionPolicy::Versioning,
            Some(versions.clone()),
            VersioningStyle::Replace,
        );
        handler.remove_file(&file, Path::new("a.txt")).unwrap();

        assert!(!file.exists());
        assert!(versions.join("a.txt").exists());
    }
}
