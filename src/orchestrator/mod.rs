/*!
 * Sync orchestrator (component E)
 *
 * Ties the comparison tree, the deletion handlers, and the three-pass
 * executor together behind the pre-flight checks described for a single
 * folder pair. Cross-pair checks (pair count, overlapping roots) are the
 * caller's responsibility before constructing one `Orchestrator` per pair.
 */

pub mod callback;
pub mod passes;
pub mod stats;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{EngineConfig, FolderPairSyncCfg};
use crate::deletion::DeletionHandler;
use crate::error::Result;
use crate::fsops::primitives;
use crate::model::SyncTree;

pub use callback::{LoggingCallback, Phase, ProcessCallback, RetryDecision};
pub use passes::{assign_pass, PassContext};
pub use stats::SyncStatistics;

/// Minimum count of non-matching rows before the "significant difference"
/// warning fires.
const SIGNIFICANT_DIFFERENCE_MIN_ROWS: u64 = 10;

/// Threshold fraction (as a percentage) of non-matching rows over total
/// items that, combined with the row-count minimum, triggers the warning.
const SIGNIFICANT_DIFFERENCE_MIN_PERCENT: u64 = 50;

/// Advisory warnings surfaced by pre-flight, distinct from hard failures:
/// the caller decides whether to proceed, abort, or prompt the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightWarnings {
    pub significant_difference: bool,
    pub insufficient_disk_space: bool,
    pub unresolved_conflicts: bool,
}

impl PreflightWarnings {
    pub fn any(&self) -> bool {
        self.significant_difference || self.insufficient_disk_space || self.unresolved_conflicts
    }
}

/// Drives pre-flight checks and the 3-pass execution for a single folder
/// pair. One instance is constructed per pair per sync run.
pub struct Orchestrator<'a> {
    pair: &'a FolderPairSyncCfg,
    engine: &'a EngineConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(pair: &'a FolderPairSyncCfg, engine: &'a EngineConfig) -> Self {
        Self { pair, engine }
    }

    /// Run the pre-flight checks described for §4.6 steps 1–10 that apply
    /// at the single-pair level: config validation, base-directory
    /// creation, per-pair statistics, and the three advisory warnings.
    /// Pair-count and cross-pair dependent-path checks are run once by the
    /// caller via `validate_pairs` before any `Orchestrator` is built.
    pub fn preflight(&self, tree: &SyncTree) -> Result<(SyncStatistics, PreflightWarnings)> {
        self.pair.validate()?;
        ensure_base_directory(&self.pair.left)?;
        ensure_base_directory(&self.pair.right)?;

        let stats = passes::preflight_statistics(tree);
        let mut warnings = PreflightWarnings::default();

        let total = tree.len() as u64;
        let non_matching = stats.non_matching_rows();
        if total > 0
            && non_matching >= SIGNIFICANT_DIFFERENCE_MIN_ROWS
            && non_matching * 100 >= total * SIGNIFICANT_DIFFERENCE_MIN_PERCENT
        {
            warnings.significant_difference = true;
        }

        if stats.data_to_process > 0 {
            let left_free = primitives::free_disk_space(&self.pair.left).unwrap_or(u64::MAX);
            let right_free = primitives::free_disk_space(&self.pair.right).unwrap_or(u64::MAX);
            if stats.data_to_process > left_free || stats.data_to_process > right_free {
                warnings.insufficient_disk_space = true;
            }
        }

        if stats.conflicts > 0 {
            warnings.unresolved_conflicts = true;
        }

        Ok((stats, warnings))
    }

    /// Execute the three passes against an already-compared `tree`,
    /// reporting progress and failures through `callback`.
    pub fn run(
        &self,
        tree: &mut SyncTree,
        left_deletions: &mut DeletionHandler,
        right_deletions: &mut DeletionHandler,
        callback: &mut dyn ProcessCallback,
    ) -> Result<SyncStatistics> {
        let stats = passes::preflight_statistics(tree);

        let mut ctx = PassContext::new(
            &self.pair.left,
            &self.pair.right,
            self.pair,
            left_deletions,
            right_deletions,
            self.engine.verify_after_copy,
        );

        passes::run_zero_pass(tree, &mut ctx, callback)?;
        passes::run_delete_pass(tree, &mut ctx, callback)?;
        passes::run_create_pass(tree, &mut ctx, callback)?;

        left_deletions.try_cleanup();
        right_deletions.try_cleanup();

        info!(
            creates = stats.creates,
            updates = stats.updates,
            deletes = stats.deletes,
            conflicts = stats.conflicts,
            "sync pass complete"
        );

        Ok(stats)
    }
}

/// Create `path` if it doesn't exist yet; error if it exists but is not a
/// directory. `create_dir_all` is idempotent, so a concurrent creator
/// racing us just means one of the two calls does the real work — neither
/// observes a transient failure.
fn ensure_base_directory(path: &Path) -> Result<()> {
    match primitives::probe_path(path)? {
        primitives::PathKind::Dir => Ok(()),
        primitives::PathKind::Missing => primitives::make_directory(path),
        other => Err(crate::error::SyncError::InvalidPath(PathBuf::from(
            format!("{} exists but is not a directory ({:?})", path.display(), other),
        ))),
    }
}

/// Cross-pair pre-flight checks run once before any pair's `Orchestrator`
/// is constructed: at least one pair configured, and no pair's roots
/// nest inside another pair's roots (which would make the two runs race).
pub fn validate_pairs(pairs: &[FolderPairSyncCfg]) -> Result<()> {
    if pairs.is_empty() {
        return Err(crate::error::SyncError::Config(
            "no folder pairs configured".to_string(),
        ));
    }

    for pair in pairs {
        pair.validate()?;
    }

    for (i, a) in pairs.iter().enumerate() {
        for b in &pairs[i + 1..] {
            for (x, y) in [(&a.left, &b.left), (&a.left, &b.right), (&a.right, &b.left), (&a.right, &b.right)]
            {
                if paths_overlap(x, y) {
                    warn!(?x, ?y, "folder pairs have overlapping roots");
                    return Err(crate::error::SyncError::Config(format!(
                        "overlapping folder pair roots: {} and {}",
                        x.display(),
                        y.display()
                    )));
                }
            }
        }
    }

    Ok(())
}

fn paths_overlap(a: &Path, b: &Path) -> bool {
    a == b || a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FolderPairSyncCfg;
    use crate::model::{ItemKind, SideState};
    use std::time::SystemTime;
    use tempfile::tempdir;

    #[test]
    fn preflight_creates_missing_base_directories() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        let pair = FolderPairSyncCfg::new(&left, &right);
        let engine = EngineConfig::default();
        let orchestrator = Orchestrator::new(&pair, &engine);

        let tree = SyncTree::new();
        let (stats, warnings) = orchestrator.preflight(&tree).unwrap();

        assert!(left.is_dir());
        assert!(right.is_dir());
        assert_eq!(stats.non_matching_rows(), 0);
        assert!(!warnings.any());
    }

    #[test]
    fn preflight_flags_significant_difference() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        let pair = FolderPairSyncCfg::new(&left, &right);
        let engine = EngineConfig::default();
        let orchestrator = Orchestrator::new(&pair, &engine);

        let mut tree = SyncTree::new();
        for i in 0..20 {
            let id = tree.insert(PathBuf::from(format!("f{}.txt", i)), None);
            tree.get_mut(id).right = SideState::present(ItemKind::File {
                size: 10,
                modification_time: SystemTime::now(),
            });
            tree.set_operation(id, crate::model::SyncOperation::CreateNewLeft);
        }

        let (_, warnings) = orchestrator.preflight(&tree).unwrap();
        assert!(warnings.significant_difference);
    }

    #[test]
    fn validate_pairs_rejects_empty_list() {
        assert!(validate_pairs(&[]).is_err());
    }

    #[test]
    fn validate_pairs_rejects_overlapping_roots() {
        let a = FolderPairSyncCfg::new("/data/a", "/data/b");
        let b = FolderPairSyncCfg::new("/data/a/sub", "/data/c");
        assert!(validate_pairs(&[a, b]).is_err());
    }

    #[test]
    fn validate_pairs_accepts_disjoint_roots() {
        let a = FolderPairSyncCfg::new("/data/a", "/data/b");
        let b = FolderPairSyncCfg::new("/data/c", "/data/d");
        assert!(validate_pairs(&[a, b]).is_ok());
    }
}
