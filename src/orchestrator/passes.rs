/*!
 * Three-pass execution (component E)
 *
 * Grounded directly on `FreeFileSync/Source/synchronization.cpp`'s
 * pass-assignment table and zero-pass 2-step-move algorithm. Moves run
 * first (pass 0), then deletes and size-shrinking overwrites (pass 1),
 * then creates, size-growing/metadata-only overwrites, and move targets
 * (pass 2) -- so a shrinking overwrite frees disk space before a growing
 * one needs it, and a delete that clears the way for a move-target rename
 * always precedes that rename.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::FolderPairSyncCfg;
use crate::deletion::DeletionHandler;
use crate::error::{Result, SyncError};
use crate::fsops::{self, copy::CopyOptions, primitives};
use crate::model::{Item, ItemId, ItemKind, SyncOperation, SyncTree};

use super::callback::{Phase, ProcessCallback, RetryDecision};
use super::stats::SyncStatistics;

const TWO_STEP_SUFFIX: &str = ".dsync_tmp";
const MAX_TWO_STEP_ATTEMPTS: u32 = 100;

/// Resolve `item`'s operation's pass, taking the size-dependent overwrite
/// rule into account (the rule the `SyncOperation::default_pass` doc
/// explicitly defers to this function).
pub fn assign_pass(item: &Item, op: SyncOperation) -> u8 {
    match op {
        SyncOperation::OverwriteLeft => {
            let target_size = side_size(&item.left);
            let source_size = side_size(&item.right);
            if target_size > source_size {
                1
            } else {
                2
            }
        }
        SyncOperation::OverwriteRight => {
            let target_size = side_size(&item.right);
            let source_size = side_size(&item.left);
            if target_size > source_size {
                1
            } else {
                2
            }
        }
        other => other.default_pass(),
    }
}

fn side_size(side: &crate::model::SideState) -> u64 {
    match &side.kind {
        Some(ItemKind::File { size, .. }) => *size,
        _ => 0,
    }
}

/// Execution context threaded through all three passes: the folder pair's
/// roots and config, plus one `DeletionHandler` per side.
pub struct PassContext<'a> {
    pub left_root: &'a Path,
    pub right_root: &'a Path,
    pub cfg: &'a FolderPairSyncCfg,
    pub left_deletions: &'a mut DeletionHandler,
    pub right_deletions: &'a mut DeletionHandler,
    pub verify_after_copy: bool,
    /// Where a 2-step move's source was staged, keyed by the move source's
    /// `ItemId`; consulted by pass 2's `finish_move`.
    pub staged_moves: HashMap<ItemId, PathBuf>,
}

impl<'a> PassContext<'a> {
    pub fn new(
        left_root: &'a Path,
        right_root: &'a Path,
        cfg: &'a FolderPairSyncCfg,
        left_deletions: &'a mut DeletionHandler,
        right_deletions: &'a mut DeletionHandler,
        verify_after_copy: bool,
    ) -> Self {
        Self {
            left_root,
            right_root,
            cfg,
            left_deletions,
            right_deletions,
            verify_after_copy,
            staged_moves: HashMap::new(),
        }
    }

    fn abs(&self, root_is_left: bool, relative: &Path) -> PathBuf {
        if root_is_left {
            self.left_root.join(relative)
        } else {
            self.right_root.join(relative)
        }
    }
}

/// Run an operation with the orchestrator's standard per-item retry loop:
/// on a non-fatal error, ask the callback whether to retry or ignore; on
/// `Err(SyncError::Aborted)` from the callback, propagate immediately.
fn with_item_retry<F>(
    callback: &mut dyn ProcessCallback,
    description: &str,
    mut operation: F,
) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    callback.check_abort()?;
    let mut retry_count = 0;
    loop {
        match operation() {
            Ok(()) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let message = format!("{}: {}", description, e);
                match callback.report_error(&message, retry_count)? {
                    RetryDecision::Retry => {
                        retry_count += 1;
                        continue;
                    }
                    RetryDecision::Ignore => return Ok(()),
                }
            }
        }
    }
}

/// Zero-pass: resolve every move pair. Eager (single rename) when safe;
/// 2-step (stage at the common root with a scratch suffix, finish in pass
/// 2) when the source's parent is scheduled for deletion.
pub fn run_zero_pass(
    tree: &mut SyncTree,
    ctx: &mut PassContext<'_>,
    callback: &mut dyn ProcessCallback,
) -> Result<()> {
    callback.set_phase(Phase::Move);

    let source_ids: Vec<ItemId> = tree
        .iter()
        .filter(|item| {
            matches!(
                tree.operation(item.id),
                Some(SyncOperation::MoveLeftSource) | Some(SyncOperation::MoveRightSource)
            )
        })
        .map(|item| item.id)
        .collect();

    for id in source_ids {
        let op = tree.operation(id).expect("filtered above");
        let is_left = matches!(op, SyncOperation::MoveLeftSource);
        let target_id = match tree.get(id).move_pair {
            Some(t) => t,
            None => continue,
        };

        let source_rel = tree.get(id).relative_path.clone();
        let target_rel = tree.get(target_id).relative_path.clone();
        let source_path = ctx.abs(is_left, &source_rel);
        let target_path = ctx.abs(is_left, &target_rel);

        let expected_delete_op = if is_left {
            SyncOperation::DeleteLeft
        } else {
            SyncOperation::DeleteRight
        };
        let parent_scheduled_for_deletion = source_rel.parent().is_some_and(|parent| {
            tree.iter()
                .any(|item| item.relative_path == parent && tree.operation(item.id) == Some(expected_delete_op))
        });

        let base_root = if is_left { ctx.left_root } else { ctx.right_root };
        let result = if parent_scheduled_for_deletion {
            two_step_move_stage(base_root, &source_path).map(|staged| {
                ctx.staged_moves.insert(id, staged);
            })
        } else {
            eager_move(&source_path, &target_path)
        };

        let description = format!("move {} -> {}", source_rel.display(), target_rel.display());
        match result {
            Ok(()) => {
                debug!(%description, "move resolved");
            }
            Err(e) => {
                warn!(error = %e, %description, "move failed, degrading to independent create+delete");
                tree.get_mut(id).move_pair = None;
                tree.get_mut(target_id).move_pair = None;
                let (delete_op, create_op) = if is_left {
                    (SyncOperation::DeleteLeft, SyncOperation::CreateNewLeft)
                } else {
                    (SyncOperation::DeleteRight, SyncOperation::CreateNewRight)
                };
                tree.set_operation(id, delete_op);
                tree.set_operation(target_id, create_op);
                let message = format!("{}: {}", description, e);
                callback.report_warning(&message, &mut false);
            }
        }
    }

    Ok(())
}

fn eager_move(source_path: &Path, target_path: &Path) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        primitives::make_directory(parent)?;
    }
    primitives::rename(source_path, target_path)
}

/// Stage the move source at a scratch name under the folder pair's base
/// root (not a sibling of the source itself, which may sit inside a
/// directory scheduled for deletion in this very pass); pass 2 will rename
/// the scratch path onto the final target once the intervening delete has
/// run. Returns the staged path so the caller can record it for pass 2 to
/// find.
fn two_step_move_stage(base_root: &Path, source_path: &Path) -> Result<PathBuf> {
    let item_name = source_path.file_name().unwrap_or_default();
    let candidate = base_root.join(item_name);
    let scratch =
        primitives::unique_sibling_with_suffix(&candidate, TWO_STEP_SUFFIX, MAX_TWO_STEP_ATTEMPTS)?;
    primitives::rename(source_path, &scratch)?;
    Ok(scratch)
}

/// Pass 1: deletions and size-shrinking overwrites.
pub fn run_delete_pass(
    tree: &mut SyncTree,
    ctx: &mut PassContext<'_>,
    callback: &mut dyn ProcessCallback,
) -> Result<()> {
    callback.set_phase(Phase::Delete);
    run_pass(tree, ctx, callback, 1)
}

/// Pass 2: creates, growing/metadata-only overwrites, and move targets.
pub fn run_create_pass(
    tree: &mut SyncTree,
    ctx: &mut PassContext<'_>,
    callback: &mut dyn ProcessCallback,
) -> Result<()> {
    callback.set_phase(Phase::Create);
    run_pass(tree, ctx, callback, 2)
}

fn run_pass(
    tree: &mut SyncTree,
    ctx: &mut PassContext<'_>,
    callback: &mut dyn ProcessCallback,
    pass: u8,
) -> Result<()> {
    let ids: Vec<ItemId> = tree
        .iter()
        .filter_map(|item| {
            let op = tree.operation(item.id)?;
            if assign_pass(item, op) == pass {
                Some(item.id)
            } else {
                None
            }
        })
        .collect();

    for id in ids {
        let op = match tree.operation(id) {
            Some(op) => op,
            None => continue,
        };
        if !op.mutates() {
            continue;
        }
        dispatch_item(tree, id, op, ctx, callback)?;
    }

    Ok(())
}

fn dispatch_item(
    tree: &mut SyncTree,
    id: ItemId,
    op: SyncOperation,
    ctx: &mut PassContext<'_>,
    callback: &mut dyn ProcessCallback,
) -> Result<()> {
    let relative_path = tree.get(id).relative_path.clone();
    let description = format!("{:?} {}", op, relative_path.display());

    match op {
        SyncOperation::DeleteLeft => with_item_retry(callback, &description, || {
            delete_item(tree.get(id), true, ctx)
        }),
        SyncOperation::DeleteRight => with_item_retry(callback, &description, || {
            delete_item(tree.get(id), false, ctx)
        }),
        SyncOperation::CreateNewLeft | SyncOperation::OverwriteLeft => {
            with_item_retry(callback, &description, || {
                copy_item(tree.get(id), true, ctx)
            })
        }
        SyncOperation::CreateNewRight | SyncOperation::OverwriteRight => {
            with_item_retry(callback, &description, || {
                copy_item(tree.get(id), false, ctx)
            })
        }
        SyncOperation::CopyMetadataToLeft => with_item_retry(callback, &description, || {
            copy_metadata(tree.get(id), true, ctx)
        }),
        SyncOperation::CopyMetadataToRight => with_item_retry(callback, &description, || {
            copy_metadata(tree.get(id), false, ctx)
        }),
        SyncOperation::MoveLeftTarget | SyncOperation::MoveRightTarget => {
            with_item_retry(callback, &description, || finish_move(tree, id, ctx))
        }
        _ => Ok(()),
    }
}

fn delete_item(item: &Item, is_left: bool, ctx: &mut PassContext<'_>) -> Result<()> {
    let path = ctx.abs(is_left, &item.relative_path);
    if !primitives::exists(&path) {
        return Ok(());
    }

    let kind = if is_left { &item.left.kind } else { &item.right.kind };
    let handler = if is_left {
        &mut ctx.left_deletions
    } else {
        &mut ctx.right_deletions
    };

    match kind {
        Some(ItemKind::Dir) => handler.remove_dir(&path, &item.relative_path),
        _ => handler.remove_file(&path, &item.relative_path),
    }
}

fn copy_item(item: &Item, dest_is_left: bool, ctx: &mut PassContext<'_>) -> Result<()> {
    let (source_side, source_is_left) = if dest_is_left {
        (&item.right, false)
    } else {
        (&item.left, true)
    };

    let source_path = ctx.abs(source_is_left, &item.relative_path);
    let dest_path = ctx.abs(dest_is_left, &item.relative_path);

    match &source_side.kind {
        Some(ItemKind::Dir) => {
            primitives::make_directory(&dest_path)?;
            if ctx.cfg.copy_permissions {
                let _ = primitives::copy_permissions(&source_path, &dest_path);
            }
            Ok(())
        }
        Some(ItemKind::Link { .. }) => fsops::primitives::copy_symlink(&source_path, &dest_path),
        Some(ItemKind::File { .. }) | None => {
            if let Some(parent) = dest_path.parent() {
                primitives::make_directory(parent)?;
            }
            let options = CopyOptions {
                preserve_times: true,
                copy_permissions: ctx.cfg.copy_permissions,
                verify_after_copy: ctx.verify_after_copy,
            };
            let relative_path = item.relative_path.clone();
            let deletions: &mut DeletionHandler = if dest_is_left {
                &mut *ctx.left_deletions
            } else {
                &mut *ctx.right_deletions
            };
            let mut before_delete_target =
                move |existing: &Path| deletions.remove_file(existing, &relative_path);
            fsops::copy_file(
                &source_path,
                &dest_path,
                &options,
                Some(&mut before_delete_target),
            )
            .map(|_| ())
        }
    }
}

fn copy_metadata(item: &Item, dest_is_left: bool, ctx: &mut PassContext<'_>) -> Result<()> {
    let (source_side, source_is_left) = if dest_is_left {
        (&item.right, false)
    } else {
        (&item.left, true)
    };
    let _ = source_is_left;

    let dest_path = ctx.abs(dest_is_left, &item.relative_path);
    if let Some(ItemKind::File {
        modification_time, ..
    }) = &source_side.kind
    {
        primitives::set_file_time(&dest_path, *modification_time)?;
    }
    Ok(())
}

fn finish_move(tree: &mut SyncTree, target_id: ItemId, ctx: &mut PassContext<'_>) -> Result<()> {
    let target = tree.get(target_id);
    let is_left = matches!(
        tree.operation(target_id),
        Some(SyncOperation::MoveLeftTarget)
    );
    let source_id = match target.move_pair {
        Some(s) => s,
        None => {
            return Err(SyncError::Other(
                "move target has no linked source".to_string(),
            ))
        }
    };

    let target_rel = tree.get(target_id).relative_path.clone();
    let actual_source = match ctx.staged_moves.remove(&source_id) {
        Some(staged) => staged,
        None => {
            let source_rel = tree.get(source_id).relative_path.clone();
            ctx.abs(is_left, &source_rel)
        }
    };

    let target_path = ctx.abs(is_left, &target_rel);
    if let Some(parent) = target_path.parent() {
        primitives::make_directory(parent)?;
    }
    primitives::rename(&actual_source, &target_path)
}

pub fn preflight_statistics(tree: &SyncTree) -> SyncStatistics {
    let mut stats = SyncStatistics::new();
    for item in tree.iter() {
        if let Some(op) = tree.operation(item.id) {
            stats.accumulate(item, op);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SideState;
    use std::time::SystemTime;

    #[test]
    fn shrinking_overwrite_goes_to_pass_one() {
        let mut tree = SyncTree::new();
        let id = tree.insert(PathBuf::from("a.txt"), None);
        tree.get_mut(id).left = SideState::present(ItemKind::File {
            size: 1000,
            modification_time: SystemTime::now(),
        });
        tree.get_mut(id).right = SideState::present(ItemKind::File {
            size: 10,
            modification_time: SystemTime::now(),
        });

        assert_eq!(assign_pass(tree.get(id), SyncOperation::OverwriteLeft), 1);
    }

    #[test]
    fn growing_overwrite_goes_to_pass_two() {
        let mut tree = SyncTree::new();
        let id = tree.insert(PathBuf::from("a.txt"), None);
        tree.get_mut(id).left = SideState::present(ItemKind::File {
            size: 10,
            modification_time: SystemTime::now(),
        });
        tree.get_mut(id).right = SideState::present(ItemKind::File {
            size: 1000,
            modification_time: SystemTime::now(),
        });

        assert_eq!(assign_pass(tree.get(id), SyncOperation::OverwriteLeft), 2);
    }

    #[test]
    fn create_and_delete_use_default_pass() {
        let tree = SyncTree::new();
        let dummy = Item {
            id: ItemId(0),
            relative_path: PathBuf::from("a"),
            parent: None,
            left: SideState::absent(),
            right: SideState::absent(),
            move_pair: None,
        };
        let _ = &tree;
        assert_eq!(assign_pass(&dummy, SyncOperation::DeleteLeft), 1);
        assert_eq!(assign_pass(&dummy, SyncOperation::CreateNewRight), 2);
    }
}
