/*!
 * Path probes and single-file/directory primitives (component A)
 *
 * Mirrors the low-level surface of `zen/file_access.cpp`: existence checks,
 * free-space queries, delete/rename/mkdir, symlink handling, and timestamp
 * preservation, with Unix permission/ownership copy layered on top the way
 * the reference codebase's metadata modules do it.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::{set_file_mtime, FileTime};

use crate::error::{Result, SyncError};

#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, PermissionsExt};

/// What kind of object a path currently resolves to, without following
/// symlinks for the Link case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Missing,
    File,
    Dir,
    Symlink,
}

pub fn probe_path(path: &Path) -> Result<PathKind> {
    match fs::symlink_metadata(path) {
        Ok(meta) => {
            let ft = meta.file_type();
            if ft.is_symlink() {
                Ok(PathKind::Symlink)
            } else if ft.is_dir() {
                Ok(PathKind::Dir)
            } else {
                Ok(PathKind::File)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(e) => Err(SyncError::Io(e)),
    }
}

pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Size in bytes of a regular file. Errs on directories and missing paths.
pub fn filesize(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(path.to_path_buf())
        } else {
            SyncError::Io(e)
        }
    })?;
    if meta.is_dir() {
        return Err(SyncError::InvalidPath(path.to_path_buf()));
    }
    Ok(meta.len())
}

/// Free space available on the volume containing `path`, in bytes.
///
/// No portable stdlib call exists for this; on unix we go through `statvfs`
/// via `libc` the way the reference codebase's disk-space guard does.
#[cfg(unix)]
pub fn free_disk_space(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path.as_os_str().to_string_lossy().as_bytes())
        .map_err(|_| SyncError::InvalidPath(path.to_path_buf()))?;

    unsafe {
        let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
        let rc = libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr());
        if rc != 0 {
            return Err(SyncError::SystemCallFailed {
                function: "statvfs",
                raw_code: rc,
                message: std::io::Error::last_os_error().to_string(),
            });
        }
        let stat = stat.assume_init();
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(not(unix))]
pub fn free_disk_space(_path: &Path) -> Result<u64> {
    Ok(u64::MAX)
}

/// Delete a file, retrying once after clearing a read-only attribute — the
/// original clears `FILE_ATTRIBUTE_READONLY` on Windows before unlinking;
/// on unix the equivalent is adding the owner-write bit.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            if let Ok(meta) = fs::metadata(path) {
                let mut perms = meta.permissions();
                #[cfg(unix)]
                {
                    let mode = perms.mode() | 0o200;
                    perms.set_mode(mode);
                }
                #[allow(unused)]
                {
                    perms.set_readonly(false);
                }
                let _ = fs::set_permissions(path, perms);
            }
            fs::remove_file(path).map_err(SyncError::Io)
        }
        Err(e) => Err(SyncError::Io(e)),
    }
}

pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(SyncError::Io)
}

pub fn remove_directory_plain(path: &Path) -> Result<()> {
    fs::remove_dir(path).map_err(SyncError::Io)
}

/// Rename `from` to `to`, surfacing cross-volume failures distinctly so
/// callers can fall back to copy+delete rather than treat it as a bare I/O
/// error.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            #[cfg(unix)]
            {
                if e.raw_os_error() == Some(libc::EXDEV) {
                    return Err(SyncError::DifferentVolume {
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                    });
                }
            }
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(SyncError::TargetPathMissing(to.to_path_buf()));
            }
            Err(SyncError::Io(e))
        }
    }
}

pub fn make_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(SyncError::Io)
}

/// Create exactly one directory level; errs (rather than no-ops) if it
/// already exists, mirroring `zen::makeDirectory`'s strict-create contract
/// used by the orchestrator's pass-2 create step.
pub fn make_directory_plain(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(SyncError::TargetExisting(path.to_path_buf()))
        }
        Err(e) => Err(SyncError::Io(e)),
    }
}

pub fn set_file_time(path: &Path, modification_time: SystemTime) -> Result<()> {
    let ft = FileTime::from_system_time(modification_time);
    set_file_mtime(path, ft).map_err(SyncError::Io)
}

pub fn resolve_symlink_target(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(path.to_path_buf())
        } else {
            SyncError::Io(e)
        }
    })
}

#[cfg(unix)]
pub fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let target = resolve_symlink_target(source)?;
    std::os::unix::fs::symlink(&target, dest).map_err(SyncError::Io)
}

#[cfg(not(unix))]
pub fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let target = resolve_symlink_target(source)?;
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(&target, dest).map_err(SyncError::Io)
    } else {
        std::os::windows::fs::symlink_file(&target, dest).map_err(SyncError::Io)
    }
}

/// Find a name near `path` with `suffix` appended that doesn't currently
/// exist, trying `<path><suffix>` then `<path><suffix>_1`, `_2`, ... up to
/// `max_attempts`. Shared by the transactional copy's scratch-name picker
/// and the zero-pass's 2-step-move scratch name.
pub fn unique_sibling_with_suffix(path: &Path, suffix: &str, max_attempts: u32) -> Result<PathBuf> {
    let base = sibling_with_suffix(path, suffix);
    if !exists(&base) {
        return Ok(base);
    }
    for n in 1..max_attempts {
        let candidate = sibling_with_suffix(path, &format!("{}_{}", suffix, n));
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(SyncError::Other(format!(
        "could not find a free name near {} with suffix {}",
        path.display(),
        suffix
    )))
}

pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Whether the filesystem containing `path` is expected to support POSIX
/// permission bits and ownership. Used to decide whether a permission-copy
/// failure should be swallowed (see `copy::copy_file`'s `copy_permissions`
/// handling for non-privileged callers).
pub fn supports_permissions(_path: &Path) -> bool {
    cfg!(unix)
}

/// Copy ownership/permission bits from `source` onto `dest`. Best-effort:
/// a permission-denied failure (e.g. non-root trying to `chown`) is
/// swallowed rather than propagated, matching the Open Question decision
/// recorded in this crate's design notes.
#[cfg(unix)]
pub fn copy_permissions(source: &Path, dest: &Path) -> Result<()> {
    let meta = fs::metadata(source).map_err(SyncError::Io)?;
    let mode = meta.permissions().mode();
    if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(mode)) {
        if e.kind() != std::io::ErrorKind::PermissionDenied {
            return Err(SyncError::Io(e));
        }
    }

    let uid = meta.uid();
    let gid = meta.gid();
    unsafe {
        let c_path = std::ffi::CString::new(dest.as_os_str().to_string_lossy().as_bytes())
            .map_err(|_| SyncError::InvalidPath(dest.to_path_buf()))?;
        let rc = libc::chown(c_path.as_ptr(), uid, gid);
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::PermissionDenied {
                return Err(SyncError::SystemCallFailed {
                    function: "chown",
                    raw_code: rc,
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn copy_permissions(_source: &Path, _dest: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn probe_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.txt");
        assert_eq!(probe_path(&path).unwrap(), PathKind::Missing);
    }

    #[test]
    fn probe_and_filesize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(probe_path(&path).unwrap(), PathKind::File);
        assert_eq!(filesize(&path).unwrap(), 5);
    }

    #[test]
    fn filesize_on_directory_errors() {
        let dir = tempdir().unwrap();
        assert!(filesize(dir.path()).is_err());
    }

    #[test]
    fn rename_within_same_volume() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("old.txt");
        let to = dir.path().join("new.txt");
        std::fs::write(&from, b"x").unwrap();

        rename(&from, &to).unwrap();
        assert!(!exists(&from));
        assert!(exists(&to));
    }

    #[test]
    fn make_directory_plain_errs_on_existing() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        make_directory_plain(&sub).unwrap();
        assert!(make_directory_plain(&sub).is_err());
    }

    #[test]
    fn set_and_read_back_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let target = SystemTime::now() - std::time::Duration::from_secs(3600);
        set_file_time(&path, target).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let got = meta.modified().unwrap();
        let diff = got
            .duration_since(target)
            .unwrap_or_else(|e| e.duration());
        assert!(diff.as_secs() < 2);
    }
}
