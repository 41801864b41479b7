//! Diagnostic logging for the process
//!
//! Provides the leveled logging core with size-rotated files, a bridge capturing output
//! sent to the global tracing/log destination, and crash capture through the panic hook.

pub mod bridge;
pub mod crash;
pub mod format;
pub mod log_core;
pub mod retention;
pub mod rotation;

pub use self::bridge::{
    BridgeWriter, RedirectableSink, StandardLogBridge, TracingSink, SYS_LOG_TAG,
};
pub use self::crash::{CrashFile, FaultHook, PanicHook, CRASH_FILE_NAME};
pub use self::format::{format_message, LogEntry, LogLevel, DEFAULT_COMPONENT};
pub use self::log_core::{global, init_global, LogCore, LoggerCell, LOG_FILE_NAME};
pub use self::retention::{prune_backups, BackupFile, BackupNaming};
pub use self::rotation::{RotatingWriter, RotationPolicy};
