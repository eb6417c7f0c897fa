/*!
 * Directory watcher (component F)
 *
 * Wraps `notify`'s recommended backend rather than hand-rolling a
 * per-platform notification source, per the implementation note that this
 * crate should lean on the ecosystem watcher rather than reimplement
 * `ReadDirectoryChangesW`/`inotify`/`FSEvents` directly. Rename events are
 * collated into a `Delete` + `Create` pair; consecutive `Modified` events on
 * a directory are suppressed (child events already carry the signal).
 */

pub mod monitor;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Engine-owned artifact suffixes the watcher must never surface as a
/// user-visible change, plus the one platform artifact (`.DS_Store`) that
/// isn't ours but is equally noise.
const IGNORED_SUFFIXES: &[&str] = &[".dsync_tmp", ".dsync_db", ".dsync_lock", ".DS_Store"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub path: PathBuf,
}

fn is_ignored(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// A single watched folder root. Collects raw `notify` events into a
/// channel; `get_changes` drains and collates them into the engine's
/// `ChangeEvent` vocabulary.
pub struct DirWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    events: Receiver<notify::Result<Event>>,
}

impl DirWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let (tx, rx) = channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| SyncError::Other(format!("failed to start directory watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Other(format!("failed to watch {}: {}", root.display(), e)))?;

        Ok(Self {
            root,
            watcher: Some(watcher),
            events: rx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drain every event queued since the last call, collating renames and
    /// dropping ignored-suffix and directory-`Modified` noise. Non-blocking.
    pub fn get_changes(&mut self) -> Vec<ChangeEvent> {
        let mut changes = Vec::new();

        while let Ok(result) = self.events.try_recv() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "watcher backend reported an error");
                    continue;
                }
            };
            self.collate(event, &mut changes);
        }

        changes
    }

    fn collate(&self, event: Event, out: &mut Vec<ChangeEvent>) {
        use notify::event::{ModifyKind, RenameMode};

        match event.kind {
            EventKind::Create(_) => {
                for path in event.paths {
                    push_unless_ignored(out, ChangeAction::Create, path);
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    push_unless_ignored(out, ChangeAction::Delete, path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                push_unless_ignored(out, ChangeAction::Delete, event.paths[0].clone());
                push_unless_ignored(out, ChangeAction::Create, event.paths[1].clone());
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in event.paths {
                    // Single-ended rename notifications (from-side only, or
                    // to-side only): treat conservatively as an update
                    // rather than guessing direction.
                    push_unless_ignored(out, ChangeAction::Update, path);
                }
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {
                for path in event.paths {
                    if path.is_dir() {
                        debug!(?path, "suppressing directory metadata-only event");
                        continue;
                    }
                    push_unless_ignored(out, ChangeAction::Update, path);
                }
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    push_unless_ignored(out, ChangeAction::Update, path);
                }
            }
            EventKind::Access(_) | EventKind::Other | EventKind::Any => {}
        }
    }

    /// Release the watch handle and synthesize the single `{Delete,
    /// rootPath}` event the monitor loop needs to treat the base directory
    /// as missing, per the graceful-unmount contract.
    pub fn release(&mut self) -> ChangeEvent {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.root);
        }
        ChangeEvent {
            action: ChangeAction::Delete,
            path: self.root.clone(),
        }
    }
}

fn push_unless_ignored(out: &mut Vec<ChangeEvent>, action: ChangeAction, path: PathBuf) {
    if is_ignored(&path) {
        return;
    }
    out.push(ChangeEvent { action, path });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_scratch_and_db_suffixes() {
        assert!(is_ignored(Path::new("/a/b/file.txt.dsync_tmp")));
        assert!(is_ignored(Path::new("/a/b/pair.dsync_db")));
        assert!(is_ignored(Path::new("/a/b/.DS_Store")));
        assert!(!is_ignored(Path::new("/a/b/file.txt")));
    }

    #[test]
    fn release_synthesizes_root_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = DirWatcher::new(dir.path()).unwrap();
        let event = watcher.release();
        assert_eq!(event.action, ChangeAction::Delete);
        assert_eq!(event.path, dir.path());
    }
}
