/*!
 * Configuration structures and defaults for the sync engine
 */

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What happens to a file/directory that a sync pass decides to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Unlink immediately, no trace kept
    Permanent,
    /// Move to the platform recycle bin (falls back to versioning if unavailable)
    Recycler,
    /// Move into a versioning folder instead of deleting
    Versioning,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self::Recycler
    }
}

/// How a file is named once it lands in the versioning folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningStyle {
    /// Overwrite any prior version at the same relative path
    Replace,
    /// Append a " YYYY-MM-DD HHMMSS" timestamp before the extension
    AddTimestamp,
}

impl Default for VersioningStyle {
    fn default() -> Self {
        Self::AddTimestamp
    }
}

/// How to handle symbolic links during traversal and copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkMode {
    /// Copy the symbolic link itself (preserve as symlink)
    Preserve,
    /// Follow the link and copy the target file/directory
    Follow,
    /// Skip symbolic links entirely
    Skip,
}

impl Default for SymlinkMode {
    fn default() -> Self {
        Self::Preserve
    }
}

/// One side of a sync direction decision, set per folder pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Propagate changes in both directions (the default bidirectional mode)
    TwoWay,
    /// Make the right folder mirror the left
    MirrorLeftToRight,
    /// Make the left folder mirror the right
    MirrorRightToLeft,
}

impl Default for SyncDirection {
    fn default() -> Self {
        Self::TwoWay
    }
}

/// Configuration for a single left/right folder pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderPairSyncCfg {
    /// Left-hand folder root
    pub left: PathBuf,

    /// Right-hand folder root
    pub right: PathBuf,

    /// Sync direction for this pair
    #[serde(default)]
    pub direction: SyncDirection,

    /// What to do with files a pass decides to remove
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Folder to hold versioned/recycled files (required if deletion_policy is Versioning,
    /// also used as the Recycler staging area when recycling across a different volume)
    #[serde(default)]
    pub versioning_folder: Option<PathBuf>,

    /// Naming style used inside the versioning folder
    #[serde(default)]
    pub versioning_style: VersioningStyle,

    /// How to handle symbolic links
    #[serde(default)]
    pub symlink_mode: SymlinkMode,

    /// Glob-style patterns (relative to each folder root) to exclude from traversal
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Whether to detect moved files (vs. treating them as a delete + create pair)
    #[serde(default = "default_true")]
    pub detect_moves: bool,

    /// Preserve file ownership/ACLs in addition to timestamps and permission bits
    #[serde(default)]
    pub copy_permissions: bool,
}

fn default_true() -> bool {
    true
}

impl FolderPairSyncCfg {
    pub fn new(left: impl Into<PathBuf>, right: impl Into<PathBuf>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            direction: SyncDirection::default(),
            deletion_policy: DeletionPolicy::default(),
            versioning_folder: None,
            versioning_style: VersioningStyle::default(),
            symlink_mode: SymlinkMode::default(),
            exclude_patterns: Vec::new(),
            detect_moves: true,
            copy_permissions: false,
        }
    }

    /// Validate cross-field invariants not expressible with serde defaults alone
    pub fn validate(&self) -> Result<()> {
        if self.deletion_policy == DeletionPolicy::Versioning && self.versioning_folder.is_none() {
            return Err(SyncError::VersioningNotConfigured);
        }
        Ok(())
    }
}

/// Top-level configuration: engine-wide knobs plus the list of folder pairs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalSyncConfig {
    #[serde(default)]
    pub pairs: Vec<FolderPairSyncCfg>,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Engine-wide knobs independent of any single folder pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of chunks for buffered copy I/O (in bytes)
    pub chunk_size: usize,

    /// Number of retry attempts on a transient per-item failure
    pub retry_attempts: u32,

    /// Initial delay between retry attempts in seconds
    pub retry_delay_secs: u64,

    /// Whether to use exponential backoff for retries
    pub exponential_backoff: bool,

    /// Verify copied data by re-reading and comparing after each copy
    pub verify_after_copy: bool,

    /// Poll interval for the realtime monitor loop, in seconds
    pub watch_check_interval_secs: u64,

    /// Minimum log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// If set, logs go to this file as JSON; otherwise compact text to stdout
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Force DEBUG level regardless of log_level
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            retry_attempts: 3,
            retry_delay_secs: 5,
            exponential_backoff: true,
            verify_after_copy: false,
            watch_check_interval_secs: 1,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Logging verbosity level, mapped onto `tracing::Level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl GlobalSyncConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("failed to parse config file: {}", e)))
    }

    /// Load configuration with fallback priority:
    /// 1. ./duplex-sync.toml (project-specific)
    /// 2. ~/.duplex-sync/config.toml (user defaults)
    /// 3. Built-in defaults (no pairs configured)
    pub fn load_with_fallback() -> Self {
        if let Ok(config) = Self::load(Path::new("duplex-sync.toml")) {
            return config;
        }

        if let Some(home) = home_dir() {
            let user_config = home.join(".duplex-sync").join("config.toml");
            if let Ok(config) = Self::load(&user_config) {
                return config;
            }
        }

        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        for pair in &self.pairs {
            pair.validate()?;
        }
        Ok(())
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
