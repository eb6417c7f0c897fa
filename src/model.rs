/*!
 * In-memory data model for a folder pair comparison.
 *
 * The two-sided, movable-item tree loosely mirrors a `HierarchyObject`-style
 * C++ class hierarchy, but since Rust has no convenient cyclic pointers, the
 * whole tree is flattened into a single arena (`Vec<Item>`) addressed by
 * `ItemId`. Move-pair bookkeeping is then just a pair of indices instead of
 * shared/weak pointers.
 */

use std::path::PathBuf;
use std::time::SystemTime;

/// Index into a `SyncTree`'s arena. `Copy` so it can be threaded through
/// work queues the way the reference codebase threads small value types
/// like `EntryType` through its work-item structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub usize);

/// Stable identity used to recognize the same physical file across a rescan,
/// independent of path (inode+device on unix, file index on windows in the
/// original; here a simple content-addressable stand-in is out of scope, so
/// identity is the path itself plus size+mtime, which is sufficient for the
/// move-detection heuristics this crate implements).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    pub size: u64,
    pub modification_time: SystemTime,
}

/// Metadata captured by the last successful sync of a given item, used to
/// distinguish "changed since last sync" from "always been different".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InSyncAttributes {
    pub size: u64,
    pub modification_time: SystemTime,
}

/// What kind of filesystem object an `Item` represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    File {
        size: u64,
        modification_time: SystemTime,
    },
    Link {
        target: PathBuf,
    },
    Dir,
}

/// One side (left or right) of a compared item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideState {
    pub exists: bool,
    pub kind: Option<ItemKind>,
    pub last_synced: Option<InSyncAttributes>,
}

impl SideState {
    pub fn absent() -> Self {
        Self {
            exists: false,
            kind: None,
            last_synced: None,
        }
    }

    pub fn present(kind: ItemKind) -> Self {
        Self {
            exists: true,
            kind: Some(kind),
            last_synced: None,
        }
    }
}

/// A single node in the comparison tree: a path relative to both folder
/// roots, with independent left/right state and an optional move-pair link.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub relative_path: PathBuf,
    pub parent: Option<ItemId>,
    pub left: SideState,
    pub right: SideState,
    /// If this item was detected as one half of a move, the other half's id
    pub move_pair: Option<ItemId>,
}

/// The decided action for one item, computed by the comparison stage and
/// consumed by the orchestrator's pass-assignment logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// Left is empty, create from right
    CreateNewLeft,
    /// Right is empty, create from left
    CreateNewRight,
    /// Delete the left-side item
    DeleteLeft,
    /// Delete the right-side item
    DeleteRight,
    /// Both sides exist; overwrite left with right's content
    OverwriteLeft,
    /// Both sides exist; overwrite right with left's content
    OverwriteRight,
    /// Contents agree; only timestamps/metadata need to move to the left
    CopyMetadataToLeft,
    /// Contents agree; only timestamps/metadata need to move to the right
    CopyMetadataToRight,
    /// Half of a move pair: the item as it used to be named, on the left
    MoveLeftSource,
    /// Half of a move pair: the item at its new name, on the left
    MoveLeftTarget,
    /// Half of a move pair: the item as it used to be named, on the right
    MoveRightSource,
    /// Half of a move pair: the item at its new name, on the right
    MoveRightTarget,
    /// Both sides already agree; no I/O
    DoNothing,
    /// Alias of `DoNothing` used once an item has been brought in sync
    Equal,
    /// The comparator declined to pick a direction; no I/O, stats only
    UnresolvedConflict,
}

impl SyncOperation {
    /// True for the four move variants.
    pub fn is_move(self) -> bool {
        matches!(
            self,
            SyncOperation::MoveLeftSource
                | SyncOperation::MoveLeftTarget
                | SyncOperation::MoveRightSource
                | SyncOperation::MoveRightTarget
        )
    }

    /// Whether this operation performs any filesystem mutation at all.
    pub fn mutates(self) -> bool {
        !matches!(
            self,
            SyncOperation::DoNothing | SyncOperation::Equal | SyncOperation::UnresolvedConflict
        )
    }

    /// Static pass assignment per the dispatch table in the orchestrator's
    /// design (§4.6): move-sources are handled entirely within the
    /// zero-pass and never scheduled here; `Overwrite*`'s pass depends on a
    /// size comparison the enum alone can't express, so callers needing
    /// that distinction should use `orchestrator::passes::assign_pass`
    /// instead of this method.
    pub fn default_pass(self) -> u8 {
        match self {
            SyncOperation::MoveLeftSource | SyncOperation::MoveRightSource => 0,
            SyncOperation::DeleteLeft | SyncOperation::DeleteRight => 1,
            SyncOperation::OverwriteLeft
            | SyncOperation::OverwriteRight
            | SyncOperation::CreateNewLeft
            | SyncOperation::CreateNewRight
            | SyncOperation::CopyMetadataToLeft
            | SyncOperation::CopyMetadataToRight
            | SyncOperation::MoveLeftTarget
            | SyncOperation::MoveRightTarget => 2,
            SyncOperation::DoNothing | SyncOperation::Equal | SyncOperation::UnresolvedConflict => {
                2
            }
        }
    }
}

/// The full result of comparing one folder pair: an arena of items plus the
/// decided operation for each, addressed by `ItemId`.
#[derive(Debug, Clone, Default)]
pub struct SyncTree {
    items: Vec<Item>,
    operations: Vec<Option<SyncOperation>>,
}

impl SyncTree {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn insert(&mut self, relative_path: PathBuf, parent: Option<ItemId>) -> ItemId {
        let id = ItemId(self.items.len());
        self.items.push(Item {
            id,
            relative_path,
            parent,
            left: SideState::absent(),
            right: SideState::absent(),
            move_pair: None,
        });
        self.operations.push(None);
        id
    }

    pub fn get(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }

    pub fn get_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.0]
    }

    pub fn set_operation(&mut self, id: ItemId, op: SyncOperation) {
        self.operations[id.0] = Some(op);
    }

    pub fn operation(&self, id: ItemId) -> Option<SyncOperation> {
        self.operations[id.0]
    }

    pub fn link_move_pair(&mut self, a: ItemId, b: ItemId) {
        self.items[a.0].move_pair = Some(b);
        self.items[b.0].move_pair = Some(a);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Items whose operation's *default* pass (ignoring the size-dependent
    /// overwrite rule) matches `pass`, in insertion order. The orchestrator
    /// uses `orchestrator::passes::assign_pass` instead when the
    /// size-dependent distinction for `Overwrite*` matters.
    pub fn items_in_default_pass(&self, pass: u8) -> impl Iterator<Item = &Item> + '_ {
        self.items.iter().filter(move |item| {
            self.operation(item.id).map(|op| op.default_pass()) == Some(pass)
        })
    }
}
