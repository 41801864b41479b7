//! Rotolog - leveled, trace-annotated file logging with rotation
//!
//! This library provides the process logger: leveled calls rendered to single lines,
//! size/age-based file rotation, capture of third-party output sent to the global
//! logging destination, and best-effort crash capture.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;

pub use config::{DefaultDirs, DirectoryResolver, LogConfig};
pub use context::LogContext;
pub use error::{CrashError, LogError};
pub use logging::{global, init_global, LogCore, LogLevel};
