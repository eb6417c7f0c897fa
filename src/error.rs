/*!
 * Error types for the sync engine
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// Source file or directory not found
    SourceNotFound(PathBuf),

    /// Invalid or unnormalizable path
    InvalidPath(PathBuf),

    /// I/O error
    Io(io::Error),

    /// Create/rename found the destination already present
    TargetExisting(PathBuf),

    /// Parent directory of the destination doesn't exist
    TargetPathMissing(PathBuf),

    /// Rename failed because source and target live on different volumes
    DifferentVolume { from: PathBuf, to: PathBuf },

    /// Open-for-write failed because another process holds a conflicting lock
    FileLocked {
        path: PathBuf,
        locking_processes: Vec<String>,
    },

    /// Post-copy byte comparison mismatched
    DataVerificationError { path: PathBuf },

    /// A serialized blob (sync database) was truncated
    UnexpectedEndOfStream,

    /// Low-level OS call wrapper
    SystemCallFailed {
        function: &'static str,
        raw_code: i32,
        message: String,
    },

    /// Insufficient disk space for the planned operations
    InsufficientDiskSpace { required: u64, available: u64 },

    /// Configuration error
    Config(String),

    /// Versioning requested but no versioning folder configured
    VersioningNotConfigured,

    /// Caller raised an abort signal through the progress callback
    Aborted,

    /// Retries exhausted for a per-item operation
    RetriesExhausted { attempts: u32 },

    /// Generic error with message
    Other(String),
}

impl SyncError {
    /// Check if this error is fatal (should not retry)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::SourceNotFound(_)
                | SyncError::InvalidPath(_)
                | SyncError::Config(_)
                | SyncError::VersioningNotConfigured
                | SyncError::InsufficientDiskSpace { .. }
                | SyncError::Aborted
                | SyncError::RetriesExhausted { .. }
                | SyncError::DataVerificationError { .. }
        )
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Io(io_err) => Self::is_io_transient(io_err),
            SyncError::FileLocked { .. } => true,
            _ => false,
        }
    }

    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
                | WriteZero
        )
    }

    /// Get error category for logging and instrumentation
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::SourceNotFound(_) | SyncError::InvalidPath(_) => ErrorCategory::Validation,
            SyncError::Io(_) => ErrorCategory::IoError,
            SyncError::TargetExisting(_)
            | SyncError::TargetPathMissing(_)
            | SyncError::DifferentVolume { .. }
            | SyncError::FileLocked { .. } => ErrorCategory::Filesystem,
            SyncError::DataVerificationError { .. } | SyncError::UnexpectedEndOfStream => {
                ErrorCategory::Integrity
            }
            SyncError::SystemCallFailed { .. } => ErrorCategory::IoError,
            SyncError::InsufficientDiskSpace { .. } => ErrorCategory::Resource,
            SyncError::Config(_) | SyncError::VersioningNotConfigured => {
                ErrorCategory::Configuration
            }
            SyncError::Aborted => ErrorCategory::Cancellation,
            SyncError::RetriesExhausted { .. } => ErrorCategory::Retry,
            SyncError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Path validation errors
    Validation,
    /// I/O operation errors
    IoError,
    /// Resource availability errors (disk space, memory)
    Resource,
    /// Configuration errors
    Configuration,
    /// Data integrity errors (verification, truncated streams)
    Integrity,
    /// Filesystem operations (rename, locks, cross-volume)
    Filesystem,
    /// Retry exhaustion
    Retry,
    /// User- or callback-initiated cancellation
    Cancellation,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Resource => write!(f, "resource"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Integrity => write!(f, "integrity"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Retry => write!(f, "retry"),
            ErrorCategory::Cancellation => write!(f, "cancellation"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SourceNotFound(path) => {
                write!(f, "Source not found: {}", path.display())
            }
            SyncError::InvalidPath(path) => {
                write!(f, "Invalid path: {}", path.display())
            }
            SyncError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            SyncError::TargetExisting(path) => {
                write!(f, "Target already exists: {}", path.display())
            }
            SyncError::TargetPathMissing(path) => {
                write!(f, "Target parent directory missing: {}", path.display())
            }
            SyncError::DifferentVolume { from, to } => write!(
                f,
                "Cannot rename across volumes: {} -> {}",
                from.display(),
                to.display()
            ),
            SyncError::FileLocked {
                path,
                locking_processes,
            } => {
                if locking_processes.is_empty() {
                    write!(f, "File locked by another process: {}", path.display())
                } else {
                    write!(
                        f,
                        "File locked by another process: {} (held by: {})",
                        path.display(),
                        locking_processes.join(", ")
                    )
                }
            }
            SyncError::DataVerificationError { path } => {
                write!(f, "Post-copy verification failed: {}", path.display())
            }
            SyncError::UnexpectedEndOfStream => write!(f, "Unexpected end of stream"),
            SyncError::SystemCallFailed {
                function,
                raw_code,
                message,
            } => write!(f, "{} failed (code {}): {}", function, raw_code, message),
            SyncError::InsufficientDiskSpace {
                required,
                available,
            } => write!(
                f,
                "Insufficient disk space: {} bytes required, {} bytes available",
                required, available
            ),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SyncError::VersioningNotConfigured => {
                write!(f, "Versioning requested but no versioning folder configured")
            }
            SyncError::Aborted => write!(f, "Operation aborted by caller"),
            SyncError::RetriesExhausted { attempts } => {
                write!(f, "All {} retry attempts exhausted", attempts)
            }
            SyncError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(format!("TOML parse error: {}", err))
    }
}
