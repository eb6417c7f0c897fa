/*!
 * File versioning (component D)
 *
 * Grounded directly on `FreeFileSync/Source/lib/versioning.cpp`: files
 * moved out of the synced folders are relocated into a versioning folder,
 * either replacing any prior version at the same relative path or getting
 * a `" YYYY-MM-DD HHMMSS"` timestamp spliced in before the extension. The
 * timestamp format and the `isMatchingVersion` matcher are taken from there
 * unchanged.
 */

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::VersioningStyle;
use crate::error::{Result, SyncError};
use crate::fsops::primitives;

/// Length of the `YYYY-MM-DD HHMMSS` timestamp spliced into a versioned
/// filename, e.g. `Sample.txt 2012-05-15 131513.txt`.
const TIMESTAMP_LEN: usize = 17;

pub struct FileVersioner {
    versioning_folder: PathBuf,
    style: VersioningStyle,
}

impl FileVersioner {
    pub fn new(versioning_folder: impl Into<PathBuf>, style: VersioningStyle) -> Self {
        Self {
            versioning_folder: versioning_folder.into(),
            style,
        }
    }

    /// Move `source` (relative to some synced folder root) into the
    /// versioning folder at `relative_path`, renaming per `self.style`.
    pub fn revision_file(&self, source: &Path, relative_path: &Path, now: DateTime<Utc>) -> Result<()> {
        let dest = self.versioned_path(relative_path, now);
        if let Some(parent) = dest.parent() {
            primitives::make_directory(parent)?;
        }
        self.relocate(source, &dest)
    }

    /// Recursively revision a directory by moving it wholesale into the
    /// versioning folder; unlike files, directories are never timestamped
    /// individually (the original versions the directory's files, not a
    /// synthetic directory-level entry) -- callers drive per-file
    /// `revision_file` calls while walking the subtree, so this simply
    /// relocates an already-empty directory shell after its contents have
    /// been revisioned.
    pub fn revision_dir(&self, source: &Path, relative_path: &Path) -> Result<()> {
        let dest = self.versioning_folder.join(relative_path);
        if let Some(parent) = dest.parent() {
            primitives::make_directory(parent)?;
        }
        self.relocate(source, &dest)
    }

    fn relocate(&self, source: &Path, dest: &Path) -> Result<()> {
        match primitives::rename(source, dest) {
            Ok(()) => Ok(()),
            Err(SyncError::DifferentVolume { .. }) => {
                copy_then_delete(source, dest)
            }
            Err(e) => Err(e),
        }
    }

    fn versioned_path(&self, relative_path: &Path, now: DateTime<Utc>) -> PathBuf {
        match self.style {
            VersioningStyle::Replace => self.versioning_folder.join(relative_path),
            VersioningStyle::AddTimestamp => {
                let stamped = splice_timestamp(relative_path, now);
                self.versioning_folder.join(stamped)
            }
        }
    }
}

fn copy_then_delete(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        return Err(SyncError::Other(format!(
            "cross-volume directory versioning not supported for {}",
            source.display()
        )));
    }
    std::fs::copy(source, dest).map_err(SyncError::Io)?;
    primitives::remove_file(source)
}

/// Splice a `" YYYY-MM-DD HHMMSS"` timestamp after the full shortname, then
/// re-append the original extension: `Sample.txt` -> `Sample.txt 2012-05-15
/// 131513.txt`. The whole original name survives intact in the versioned
/// file; the trailing extension is only repeated so the versioned file
/// still opens in the application that created it.
fn splice_timestamp(relative_path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stamp = now.format("%Y-%m-%d %H%M%S").to_string();
    debug_assert_eq!(stamp.len(), TIMESTAMP_LEN);

    let parent = relative_path.parent();
    let file_name = relative_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (_, ext) = split_extension(&file_name);
    let stamped_name = format!("{} {}{}", file_name, stamp, ext);

    match parent {
        Some(p) if p.as_os_str().len() > 0 => p.join(stamped_name),
        _ => PathBuf::from(stamped_name),
    }
}

/// Whether `candidate` is `shortname` with a versioning timestamp spliced
/// in, e.g. `isMatchingVersion("Sample.txt", "Sample.txt 2012-05-15
/// 131513.txt")` is true. Exposed publicly so a caller-side retention
/// policy can enumerate and prune old versions without engine support for
/// it (versioning limits themselves are out of scope).
pub fn is_matching_version(shortname: &str, candidate: &str) -> bool {
    let prefix = format!("{} ", shortname);
    let Some(rest) = candidate.strip_prefix(&prefix) else {
        return false;
    };
    if rest.len() < TIMESTAMP_LEN {
        return false;
    }
    let (timestamp, suffix) = rest.split_at(TIMESTAMP_LEN);
    let (_, ext) = split_extension(shortname);
    suffix == ext
        && timestamp.chars().enumerate().all(|(i, c)| match i {
            4 | 7 => c == '-',
            10 => c == ' ',
            _ => c.is_ascii_digit(),
        })
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 5, 15, 13, 15, 13).unwrap()
    }

    #[test]
    fn splice_timestamp_matches_original_example() {
        let path = splice_timestamp(Path::new("Sample.txt"), fixed_time());
        assert_eq!(path, PathBuf::from("Sample.txt 2012-05-15 131513.txt"));
    }

    #[test]
    fn is_matching_version_accepts_the_canonical_example() {
        assert!(is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-05-15 131513.txt"
        ));
    }

    #[test]
    fn is_matching_version_rejects_unrelated_names() {
        assert!(!is_matching_version(
            "Sample.txt",
            "Other.txt 2012-05-15 131513.txt"
        ));
        assert!(!is_matching_version("Sample.txt", "Sample.txt"));
        assert!(!is_matching_version(
            "Sample.txt",
            "Sample.txt 2012-05-15.txt"
        ));
    }

    #[test]
    fn revision_file_replace_style() {
        let dir = tempdir().unwrap();
        let versions = dir.path().join("versions");
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"v1").unwrap();

        let versioner = FileVersioner::new(&versions, VersioningStyle::Replace);
        versioner
            .revision_file(&source, Path::new("a.txt"), fixed_time())
            .unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(versions.join("a.txt")).unwrap(), b"v1");
    }

    #[test]
    fn revision_file_add_timestamp_style() {
        let dir = tempdir().unwrap();
        let versions = dir.path().join("versions");
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"v1").unwrap();

        let versioner = FileVersioner::new(&versions, VersioningStyle::AddTimestamp);
        versioner
            .revision_file(&source, Path::new("a.txt"), fixed_time())
            .unwrap();

        let expected = versions.join("a.txt 2012-05-15 131513.txt");
        assert_eq!(std::fs::read(&expected).unwrap(), b"v1");
    }
}
