/*!
 * duplex-sync - bidirectional folder synchronization engine
 *
 * Compares two folder hierarchies, detects moves, and brings them into
 * agreement via a transactional three-pass executor with configurable
 * deletion handling (permanent / recycler / versioning) and an optional
 * real-time watch mode.
 */

pub mod config;
pub mod deletion;
pub mod error;
pub mod fsops;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod traverser;
pub mod versioner;
pub mod watcher;

pub use config::{EngineConfig, FolderPairSyncCfg, GlobalSyncConfig};
pub use error::{ErrorCategory, Result, SyncError};
pub use model::{Item, ItemId, ItemKind, SyncOperation, SyncTree};
pub use orchestrator::{Orchestrator, PreflightWarnings, ProcessCallback, SyncStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
