/*!
 * Per-pair sync statistics (component E)
 */

use crate::model::{Item, SyncOperation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatistics {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub conflicts: u64,
    pub data_to_process: u64,
}

impl SyncStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one item's operation and size into the running totals; called
    /// once per item during pre-flight, before any I/O.
    pub fn accumulate(&mut self, item: &Item, op: SyncOperation) {
        match op {
            SyncOperation::CreateNewLeft | SyncOperation::CreateNewRight => {
                self.creates += 1;
                self.data_to_process += item_size(item, op);
            }
            SyncOperation::OverwriteLeft | SyncOperation::OverwriteRight => {
                self.updates += 1;
                self.data_to_process += item_size(item, op);
            }
            SyncOperation::CopyMetadataToLeft | SyncOperation::CopyMetadataToRight => {
                self.updates += 1;
            }
            SyncOperation::DeleteLeft | SyncOperation::DeleteRight => {
                self.deletes += 1;
            }
            SyncOperation::MoveLeftSource
            | SyncOperation::MoveLeftTarget
            | SyncOperation::MoveRightSource
            | SyncOperation::MoveRightTarget => {
                // Moves within a volume are metadata-only; no bytes move.
                self.updates += 1;
            }
            SyncOperation::UnresolvedConflict => {
                self.conflicts += 1;
            }
            SyncOperation::DoNothing | SyncOperation::Equal => {}
        }
    }

    /// Rows that don't match between the two sides (everything except
    /// `DoNothing`/`Equal`), used by the pre-flight "significant
    /// difference" heuristic.
    pub fn non_matching_rows(&self) -> u64 {
        self.creates + self.updates + self.deletes + self.conflicts
    }

    pub fn merge(&mut self, other: &SyncStatistics) {
        self.creates += other.creates;
        self.updates += other.updates;
        self.deletes += other.deletes;
        self.conflicts += other.conflicts;
        self.data_to_process += other.data_to_process;
    }
}

fn item_size(item: &Item, op: SyncOperation) -> u64 {
    use crate::model::ItemKind;

    let side = match op {
        SyncOperation::CreateNewLeft | SyncOperation::OverwriteLeft => &item.right,
        SyncOperation::CreateNewRight | SyncOperation::OverwriteRight => &item.left,
        _ => return 0,
    };

    match &side.kind {
        Some(ItemKind::File { size, .. }) => *size,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemKind, SyncTree};
    use std::path::PathBuf;
    use std::time::SystemTime;

    #[test]
    fn accumulates_creates_with_data_size() {
        let mut tree = SyncTree::new();
        let id = tree.insert(PathBuf::from("a.txt"), None);
        tree.get_mut(id).right = crate::model::SideState::present(ItemKind::File {
            size: 1024,
            modification_time: SystemTime::now(),
        });

        let mut stats = SyncStatistics::new();
        stats.accumulate(tree.get(id), SyncOperation::CreateNewLeft);

        assert_eq!(stats.creates, 1);
        assert_eq!(stats.data_to_process, 1024);
    }

    #[test]
    fn conflicts_counted_separately() {
        let mut tree = SyncTree::new();
        let id = tree.insert(PathBuf::from("a.txt"), None);

        let mut stats = SyncStatistics::new();
        stats.accumulate(tree.get(id), SyncOperation::UnresolvedConflict);

        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.non_matching_rows(), 1);
    }

    #[test]
    fn do_nothing_does_not_count_as_non_matching() {
        let mut tree = SyncTree::new();
        let id = tree.insert(PathBuf::from("a.txt"), None);

        let mut stats = SyncStatistics::new();
        stats.accumulate(tree.get(id), SyncOperation::DoNothing);

        assert_eq!(stats.non_matching_rows(), 0);
    }
}
