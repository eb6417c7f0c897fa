/*!
 * Minimal mtime/size comparator
 *
 * Standing in for the comparison engine the core sync orchestrator takes as
 * a given input (see its crate-level docs): walks both folder roots in
 * lockstep, one level at a time via the shared traverser, and assigns a
 * `SyncOperation` per item using a simple newer-wins rule for two-way sync
 * (mirror directions always pick a fixed side). Move detection matches
 * same-size, same-mtime files that disappeared from one name and appeared
 * at another within the same side.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use duplex_sync::config::{FolderPairSyncCfg, SyncDirection};
use duplex_sync::error::Result;
use duplex_sync::model::{ItemId, ItemKind, SideState, SyncOperation, SyncTree};
use duplex_sync::traverser::{self, DirEntry, ErrorPolicy, FileEntry, SymlinkEntry, TraversalVisitor};

#[derive(Default)]
struct LevelEntries {
    files: Vec<FileEntry>,
    symlinks: Vec<SymlinkEntry>,
    dirs: Vec<DirEntry>,
}

impl TraversalVisitor for LevelEntries {
    fn on_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }
    fn on_symlink(&mut self, entry: SymlinkEntry) {
        self.symlinks.push(entry);
    }
    fn on_dir(&mut self, entry: DirEntry) {
        self.dirs.push(entry);
    }
    fn on_error(&mut self, path: &Path, error: &duplex_sync::error::SyncError) -> ErrorPolicy {
        tracing::warn!(?path, %error, "skipping unreadable entry during comparison");
        ErrorPolicy::Skip
    }
}

fn list_level(dir: Option<&Path>) -> Result<LevelEntries> {
    let dir = match dir {
        Some(d) if d.is_dir() => d,
        _ => return Ok(LevelEntries::default()),
    };
    let mut entries = LevelEntries::default();
    traverser::traverse_level(dir, &mut entries)?;
    Ok(entries)
}

/// Build a `SyncTree` for one folder pair by recursively comparing both
/// roots. Directories that exist on only one side are still descended into
/// on that side so every descendant gets its own item.
pub fn compare_folder_pair(pair: &FolderPairSyncCfg) -> Result<SyncTree> {
    let mut tree = SyncTree::new();
    compare_level(&mut tree, pair, Some(&pair.left), Some(&pair.right), None, PathBuf::new())?;
    detect_moves(&mut tree, pair);
    Ok(tree)
}

fn compare_level(
    tree: &mut SyncTree,
    pair: &FolderPairSyncCfg,
    left_dir: Option<&Path>,
    right_dir: Option<&Path>,
    parent: Option<ItemId>,
    relative_prefix: PathBuf,
) -> Result<()> {
    let left = list_level(left_dir)?;
    let right = list_level(right_dir)?;

    let mut names: BTreeMap<String, (Option<ItemKind>, Option<PathBuf>, Option<ItemKind>, Option<PathBuf>)> =
        BTreeMap::new();

    for f in &left.files {
        names.entry(f.name.clone()).or_default().0 = Some(ItemKind::File {
            size: f.size,
            modification_time: f.modification_time,
        });
        names.get_mut(&f.name).unwrap().1 = Some(f.path.clone());
    }
    for s in &left.symlinks {
        names.entry(s.name.clone()).or_default().0 = Some(ItemKind::Link {
            target: std::fs::read_link(&s.path).unwrap_or_default(),
        });
        names.get_mut(&s.name).unwrap().1 = Some(s.path.clone());
    }
    for d in &left.dirs {
        names.entry(d.name.clone()).or_default().0 = Some(ItemKind::Dir);
        names.get_mut(&d.name).unwrap().1 = Some(d.path.clone());
    }

    for f in &right.files {
        names.entry(f.name.clone()).or_default().2 = Some(ItemKind::File {
            size: f.size,
            modification_time: f.modification_time,
        });
        names.get_mut(&f.name).unwrap().3 = Some(f.path.clone());
    }
    for s in &right.symlinks {
        names.entry(s.name.clone()).or_default().2 = Some(ItemKind::Link {
            target: std::fs::read_link(&s.path).unwrap_or_default(),
        });
        names.get_mut(&s.name).unwrap().3 = Some(s.path.clone());
    }
    for d in &right.dirs {
        names.entry(d.name.clone()).or_default().2 = Some(ItemKind::Dir);
        names.get_mut(&d.name).unwrap().3 = Some(d.path.clone());
    }

    for (name, (left_kind, left_path, right_kind, right_path)) in names {
        let relative_path = relative_prefix.join(&name);
        let id = tree.insert(relative_path.clone(), parent);

        if let Some(kind) = left_kind.clone() {
            tree.get_mut(id).left = SideState::present(kind);
        }
        if let Some(kind) = right_kind.clone() {
            tree.get_mut(id).right = SideState::present(kind);
        }

        let op = decide_operation(tree.get(id).left.kind.as_ref(), tree.get(id).right.kind.as_ref(), pair.direction);
        tree.set_operation(id, op);

        if matches!(left_kind, Some(ItemKind::Dir)) || matches!(right_kind, Some(ItemKind::Dir)) {
            compare_level(
                tree,
                pair,
                left_path.as_deref(),
                right_path.as_deref(),
                Some(id),
                relative_path,
            )?;
        }
    }

    Ok(())
}

fn decide_operation(
    left: Option<&ItemKind>,
    right: Option<&ItemKind>,
    direction: SyncDirection,
) -> SyncOperation {
    match (left, right) {
        (None, None) => SyncOperation::DoNothing,
        (None, Some(_)) => match direction {
            SyncDirection::MirrorRightToLeft | SyncDirection::TwoWay => SyncOperation::CreateNewLeft,
            SyncDirection::MirrorLeftToRight => SyncOperation::DeleteRight,
        },
        (Some(_), None) => match direction {
            SyncDirection::MirrorLeftToRight | SyncDirection::TwoWay => SyncOperation::CreateNewRight,
            SyncDirection::MirrorRightToLeft => SyncOperation::DeleteLeft,
        },
        (Some(ItemKind::Dir), Some(ItemKind::Dir)) => SyncOperation::Equal,
        (Some(l), Some(r)) => {
            if l == r {
                return SyncOperation::Equal;
            }
            match direction {
                SyncDirection::MirrorLeftToRight => SyncOperation::OverwriteRight,
                SyncDirection::MirrorRightToLeft => SyncOperation::OverwriteLeft,
                SyncDirection::TwoWay => match (l, r) {
                    (
                        ItemKind::File {
                            modification_time: left_mtime,
                            ..
                        },
                        ItemKind::File {
                            modification_time: right_mtime,
                            ..
                        },
                    ) => newer_wins(*left_mtime, *right_mtime),
                    _ => SyncOperation::UnresolvedConflict,
                },
            }
        }
    }
}

fn newer_wins(left_mtime: SystemTime, right_mtime: SystemTime) -> SyncOperation {
    const TOLERANCE: std::time::Duration = std::time::Duration::from_secs(2);
    match (
        left_mtime.duration_since(right_mtime),
        right_mtime.duration_since(left_mtime),
    ) {
        (Ok(diff), _) if diff > TOLERANCE => SyncOperation::OverwriteRight,
        (_, Ok(diff)) if diff > TOLERANCE => SyncOperation::OverwriteLeft,
        _ => SyncOperation::CopyMetadataToLeft,
    }
}

/// Link up delete/create pairs that look like the same file renamed on the
/// same side (same size, same modification time, same side missing its old
/// name and gaining a new one).
fn detect_moves(tree: &mut SyncTree, pair: &FolderPairSyncCfg) {
    if !pair.detect_moves {
        return;
    }

    let deletes: Vec<ItemId> = tree
        .iter()
        .filter(|i| matches!(tree.operation(i.id), Some(SyncOperation::DeleteLeft) | Some(SyncOperation::DeleteRight)))
        .map(|i| i.id)
        .collect();
    let creates: Vec<ItemId> = tree
        .iter()
        .filter(|i| matches!(tree.operation(i.id), Some(SyncOperation::CreateNewLeft) | Some(SyncOperation::CreateNewRight)))
        .map(|i| i.id)
        .collect();

    let mut matched_creates: Vec<bool> = vec![false; creates.len()];

    for &del_id in &deletes {
        let del_op = tree.operation(del_id).unwrap();
        let is_left = matches!(del_op, SyncOperation::DeleteLeft);
        let del_side = if is_left {
            tree.get(del_id).left.kind.clone()
        } else {
            tree.get(del_id).right.kind.clone()
        };
        let del_size_mtime = match &del_side {
            Some(ItemKind::File { size, modification_time }) => Some((*size, *modification_time)),
            _ => None,
        };
        let Some((del_size, del_mtime)) = del_size_mtime else { continue };

        for (idx, &create_id) in creates.iter().enumerate() {
            if matched_creates[idx] {
                continue;
            }
            let create_op = tree.operation(create_id).unwrap();
            let create_is_left = matches!(create_op, SyncOperation::CreateNewLeft);
            if create_is_left != is_left {
                continue;
            }
            let create_side = if create_is_left {
                tree.get(create_id).right.kind.clone()
            } else {
                tree.get(create_id).left.kind.clone()
            };
            if let Some(ItemKind::File { size, modification_time }) = create_side {
                if size == del_size && modification_time == del_mtime {
                    let (src_op, tgt_op) = if is_left {
                        (SyncOperation::MoveLeftSource, SyncOperation::MoveLeftTarget)
                    } else {
                        (SyncOperation::MoveRightSource, SyncOperation::MoveRightTarget)
                    };
                    tree.set_operation(del_id, src_op);
                    tree.set_operation(create_id, tgt_op);
                    tree.link_move_pair(del_id, create_id);
                    matched_creates[idx] = true;
                    break;
                }
            }
        }
    }
}
