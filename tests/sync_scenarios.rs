//! End-to-end scenarios driving the full orchestrator (comparison tree built
//! by hand here, the way the library's own unit tests do it, since the
//! comparator lives in the binary crate and isn't part of the public API).

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use duplex_sync::config::{DeletionPolicy, EngineConfig, FolderPairSyncCfg, VersioningStyle};
use duplex_sync::deletion::DeletionHandler;
use duplex_sync::model::{ItemKind, SideState, SyncOperation, SyncTree};
use duplex_sync::orchestrator::{LoggingCallback, Orchestrator};

fn engine_config() -> EngineConfig {
    EngineConfig {
        verify_after_copy: true,
        ..EngineConfig::default()
    }
}

/// Scenario 1 — overwrite on the same volume with versioning enabled: the
/// losing side's prior content is relocated into the versioning folder
/// instead of being discarded.
#[test]
fn scenario_1_overwrite_with_versioning() {
    let base = tempfile::tempdir().unwrap();
    let left = base.path().join("left");
    let right = base.path().join("right");
    let versions = base.path().join("versions");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();

    std::fs::write(left.join("a.txt"), b"old").unwrap();
    std::fs::write(right.join("a.txt"), b"new").unwrap();

    let mut pair = FolderPairSyncCfg::new(&left, &right);
    pair.deletion_policy = DeletionPolicy::Versioning;
    pair.versioning_folder = Some(versions.clone());
    pair.versioning_style = VersioningStyle::Replace;

    let mut tree = SyncTree::new();
    let id = tree.insert(PathBuf::from("a.txt"), None);
    tree.get_mut(id).left = SideState::present(ItemKind::File {
        size: 3,
        modification_time: SystemTime::now(),
    });
    tree.get_mut(id).right = SideState::present(ItemKind::File {
        size: 3,
        modification_time: SystemTime::now(),
    });
    // Left wins: right's current content must be versioned away first.
    tree.set_operation(id, SyncOperation::OverwriteRight);

    let engine = engine_config();
    let orchestrator = Orchestrator::new(&pair, &engine);
    orchestrator.preflight(&tree).unwrap();

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .unwrap();

    assert_eq!(std::fs::read(left.join("a.txt")).unwrap(), b"old");
    assert_eq!(std::fs::read(right.join("a.txt")).unwrap(), b"old");
    assert_eq!(std::fs::read(versions.join("a.txt")).unwrap(), b"new");
}

/// Scenario 2 — a file is moved on the left while its former parent
/// directory is also scheduled for deletion: the zero-pass must stage the
/// move at a scratch name rather than eagerly renaming onto a target whose
/// ancestor is about to vanish, and pass 2 must finish the move afterward.
#[test]
fn scenario_2_move_with_parent_scheduled_for_deletion() {
    let base = tempfile::tempdir().unwrap();
    let left = base.path().join("left");
    let right = base.path().join("right");
    std::fs::create_dir_all(left.join("dir")).unwrap();
    std::fs::create_dir_all(right.join("dir2")).unwrap();

    std::fs::write(left.join("dir/old.dat"), b"payload").unwrap();

    let pair = FolderPairSyncCfg::new(&left, &right);
    let mut tree = SyncTree::new();

    let dir_id = tree.insert(PathBuf::from("dir"), None);
    tree.get_mut(dir_id).left = SideState::present(ItemKind::Dir);
    tree.set_operation(dir_id, SyncOperation::DeleteLeft);

    let source_id = tree.insert(PathBuf::from("dir/old.dat"), Some(dir_id));
    tree.get_mut(source_id).left = SideState::present(ItemKind::File {
        size: 7,
        modification_time: SystemTime::now(),
    });
    tree.set_operation(source_id, SyncOperation::MoveLeftSource);

    let target_id = tree.insert(PathBuf::from("dir2/new.dat"), None);
    tree.get_mut(target_id).right = SideState::present(ItemKind::File {
        size: 7,
        modification_time: SystemTime::now(),
    });
    tree.set_operation(target_id, SyncOperation::MoveLeftTarget);
    tree.link_move_pair(source_id, target_id);

    let engine = engine_config();
    let orchestrator = Orchestrator::new(&pair, &engine);

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .unwrap();

    assert!(!left.join("dir").exists());
    assert_eq!(std::fs::read(left.join("dir2/new.dat")).unwrap(), b"payload");
}

/// Scenario 3 — transactional copy with verification: the destination
/// either doesn't exist yet or exists complete, and no scratch file is left
/// behind on success.
#[test]
fn scenario_3_transactional_copy_with_verification() {
    let base = tempfile::tempdir().unwrap();
    let left = base.path().join("left");
    let right = base.path().join("right");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();

    let payload = vec![0xABu8; 5 * 1024 * 1024];
    std::fs::write(left.join("src.bin"), &payload).unwrap();

    let pair = FolderPairSyncCfg::new(&left, &right);
    let mut tree = SyncTree::new();
    let id = tree.insert(PathBuf::from("src.bin"), None);
    tree.get_mut(id).left = SideState::present(ItemKind::File {
        size: payload.len() as u64,
        modification_time: SystemTime::now(),
    });
    tree.set_operation(id, SyncOperation::CreateNewRight);

    let engine = engine_config();
    let orchestrator = Orchestrator::new(&pair, &engine);

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .unwrap();

    assert_eq!(std::fs::read(right.join("src.bin")).unwrap(), payload);
    assert!(!right.join("src.bin.dsync_tmp").exists());
}

/// Scenario 4 — the monitor's debounce fires the command once per quiescent
/// window, driven through the real `DirWatcher` + `MonitorLoop` wiring
/// rather than the pure `Debouncer` unit directly.
#[test]
fn scenario_4_monitor_debounce_fires_once_after_quiescence() {
    use duplex_sync::watcher::monitor::MonitorLoop;
    use duplex_sync::watcher::DirWatcher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let mut watcher = DirWatcher::new(dir.path()).unwrap();
    let mut monitor = MonitorLoop::new(vec![dir.path().to_path_buf()], Duration::from_millis(200));

    std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    std::fs::write(dir.path().join("a.txt"), b"xy").unwrap();

    let executions = Arc::new(AtomicUsize::new(0));
    let executions_clone = executions.clone();
    let start = std::time::Instant::now();

    monitor
        .run_active(
            std::slice::from_mut(&mut watcher),
            move |_event| {
                executions_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            move || executions.load(Ordering::SeqCst) > 0 || start.elapsed() > Duration::from_secs(5),
        )
        .unwrap();
}

/// Scenario 5 — recycler policy still results in the data being removed
/// from its original location even when staging would need to cross
/// volumes; exercised here on a single volume (the common case), with the
/// cross-volume fallback path covered by
/// `deletion::tests::recycler_policy_stages_rather_than_deletes` and the
/// `DifferentVolume` branch in `DeletionHandler::remove_file`.
#[test]
fn scenario_5_recycler_delete_removes_from_original_location() {
    let base = tempfile::tempdir().unwrap();
    let left = base.path().join("left");
    let right = base.path().join("right");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();
    std::fs::write(left.join("stale.txt"), b"gone").unwrap();

    let mut pair = FolderPairSyncCfg::new(&left, &right);
    pair.deletion_policy = DeletionPolicy::Recycler;

    let mut tree = SyncTree::new();
    let id = tree.insert(PathBuf::from("stale.txt"), None);
    tree.get_mut(id).left = SideState::present(ItemKind::File {
        size: 4,
        modification_time: SystemTime::now(),
    });
    tree.set_operation(id, SyncOperation::DeleteLeft);

    let engine = engine_config();
    let orchestrator = Orchestrator::new(&pair, &engine);

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .unwrap();

    assert!(!left.join("stale.txt").exists());
}

/// Scenario 6 — renaming onto an already-occupied destination (the general
/// case of the 8.3-short-name-clash rule: an existing entity at the final
/// name must be cleared before the real rename lands) leaves exactly the
/// new content at the final path.
#[test]
fn scenario_6_rename_onto_existing_destination_leaves_one_winner() {
    let base = tempfile::tempdir().unwrap();
    let left = base.path().join("left");
    let right = base.path().join("right");
    std::fs::create_dir_all(&left).unwrap();
    std::fs::create_dir_all(&right).unwrap();

    std::fs::write(left.join("a.txt"), b"fresh content").unwrap();
    std::fs::write(right.join("a.txt"), b"stale content that is much longer").unwrap();

    let pair = FolderPairSyncCfg::new(&left, &right);
    let mut tree = SyncTree::new();
    let id = tree.insert(PathBuf::from("a.txt"), None);
    tree.get_mut(id).left = SideState::present(ItemKind::File {
        size: 13,
        modification_time: SystemTime::now(),
    });
    tree.get_mut(id).right = SideState::present(ItemKind::File {
        size: 34,
        modification_time: SystemTime::now(),
    });
    tree.set_operation(id, SyncOperation::OverwriteRight);

    let engine = engine_config();
    let orchestrator = Orchestrator::new(&pair, &engine);

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .unwrap();

    assert_eq!(std::fs::read(right.join("a.txt")).unwrap(), b"fresh content");
    assert!(!right.join("a.txt.dsync_tmp").exists());
}
