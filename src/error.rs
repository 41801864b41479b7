//! Error types for the logging core

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing or writing through the logging core
#[derive(Debug, Error)]
pub enum LogError {
    /// The log directory could not be created
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The active log file could not be opened
    #[error("failed to open log file {path}: {source}")]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The active log file could not be moved aside to a backup
    #[error("failed to rotate log file {path}: {source}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single write is larger than the rotation size limit
    #[error("write length {len} exceeds maximum file size {max}")]
    WriteTooLarge { len: u64, max: u64 },

    /// The bridge consumer thread could not be started
    #[error("failed to start log bridge: {0}")]
    SpawnBridge(#[source] io::Error),

    /// The global logging destination could not be redirected
    #[error("failed to redirect {sink} output: {message}")]
    Redirect { sink: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while wiring up crash capture
#[derive(Debug, Error)]
pub enum CrashError {
    #[error("failed to open crash log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set crash log file permission {path}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("crash log file {0} is read-only")]
    ReadOnly(PathBuf),

    #[error("failed to set crash output: {0}")]
    Register(String),
}

/// Categories of disk errors for log-write failure notices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Short description used in failure notices
    pub fn describe(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "io error",
        }
    }
}

/// Categorize an IO error
pub fn categorize_io_error(e: &io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 on Linux and 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

impl LogError {
    /// Category of the underlying disk error, if this error came from the filesystem
    pub fn disk_error_kind(&self) -> Option<DiskErrorKind> {
        match self {
            LogError::CreateDirectory { source, .. }
            | LogError::OpenLogFile { source, .. }
            | LogError::Rotate { source, .. }
            | LogError::Io(source) => Some(categorize_io_error(source)),
            _ => None,
        }
    }
}
