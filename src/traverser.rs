/*!
 * Single-level directory enumeration (component B)
 *
 * Grounded on `zen/file_traverser.cpp`: a visitor is called once per entry
 * in a single directory level (callers recurse themselves for subtrees),
 * and a read error encountered partway through a directory causes the
 * listing to restart from the top rather than silently skip the remainder
 * -- `read_dir` iterators can't be rewound, so this module reads the whole
 * level into a `Vec` first and restarts that collection step on error.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SyncError};

const MAX_RESTART_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modification_time: SystemTime,
}

#[derive(Debug, Clone)]
pub struct SymlinkEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Callback contract for one directory level. Implementations decide what
/// to do with each kind of child; `on_error` receives non-fatal per-entry
/// stat failures and returns whether traversal of this level should abort.
pub trait TraversalVisitor {
    fn on_file(&mut self, entry: FileEntry);
    fn on_symlink(&mut self, entry: SymlinkEntry);
    fn on_dir(&mut self, entry: DirEntry);
    fn on_error(&mut self, path: &Path, error: &SyncError) -> ErrorPolicy {
        let _ = (path, error);
        ErrorPolicy::Skip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Ignore this entry and continue with the rest of the level
    Skip,
    /// Abort the whole traversal, propagating the error
    Abort,
}

/// Enumerate one directory level, calling `visitor` for every child.
/// Filenames are normalized to NFC before being handed to the visitor so
/// that the same logical name compares equal regardless of which form the
/// underlying filesystem stores (relevant on OS X, which stores NFD).
pub fn traverse_level(dir: &Path, visitor: &mut dyn TraversalVisitor) -> Result<()> {
    let mut attempt = 0;
    loop {
        match traverse_level_once(dir, visitor) {
            Ok(()) => return Ok(()),
            Err(TraverseOutcome::Restart) if attempt < MAX_RESTART_ATTEMPTS => {
                attempt += 1;
                continue;
            }
            Err(TraverseOutcome::Restart) => {
                return Err(SyncError::Other(format!(
                    "directory listing for {} kept changing during enumeration",
                    dir.display()
                )))
            }
            Err(TraverseOutcome::Fatal(e)) => return Err(e),
        }
    }
}

enum TraverseOutcome {
    Restart,
    Fatal(SyncError),
}

fn traverse_level_once(
    dir: &Path,
    visitor: &mut dyn TraversalVisitor,
) -> std::result::Result<(), TraverseOutcome> {
    let read_dir = fs::read_dir(dir).map_err(|e| {
        TraverseOutcome::Fatal(if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::SourceNotFound(dir.to_path_buf())
        } else {
            SyncError::Io(e)
        })
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(e) => entries.push(e),
            Err(_) => return Err(TraverseOutcome::Restart),
        }
    }

    for entry in entries {
        let path = entry.path();
        let name = normalize_name(&entry.file_name().to_string_lossy());

        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                let sync_err = SyncError::Io(e);
                match visitor.on_error(&path, &sync_err) {
                    ErrorPolicy::Skip => continue,
                    ErrorPolicy::Abort => return Err(TraverseOutcome::Fatal(sync_err)),
                }
            }
        };

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            visitor.on_symlink(SymlinkEntry { name, path });
        } else if file_type.is_dir() {
            visitor.on_dir(DirEntry { name, path });
        } else {
            let modification_time = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            visitor.on_file(FileEntry {
                name,
                path,
                size: meta.len(),
                modification_time,
            });
        }
    }

    Ok(())
}

fn normalize_name(name: &str) -> String {
    name.nfc().collect()
}
