//! Leveled logging core
//!
//! [`LogCore`] renders each call to one line and appends it to the rotating log file.
//! Construction prepares the directory, opens the writer, starts the bridge and wires
//! crash capture. After that nothing it does can fail the caller: write errors are
//! counted and noted in the log when possible.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use super::bridge::{
    self, BridgeWriter, RedirectableSink, StandardLogBridge, TracingSink, SYS_LOG_TAG,
};
use super::crash::{self, FaultHook, PanicHook};
use super::format::{LogEntry, LogLevel};
use super::rotation::RotatingWriter;
use crate::config::{DirectoryResolver, LogConfig};
use crate::context::LogContext;
use crate::error::LogError;

/// Name of the active log file inside the log directory
pub const LOG_FILE_NAME: &str = "log";

#[derive(Debug)]
struct LineSink {
    writer: RotatingWriter,
    default_component: String,
    dropped: AtomicU64,
}

impl LineSink {
    fn log(&self, level: LogLevel, ctx: &LogContext, message: &str) {
        let line = LogEntry::capture(level, ctx, &self.default_component, message).render();
        if let Err(err) = self.writer.write_line(&line) {
            self.dropped.fetch_add(1, Ordering::Relaxed);

            let reason = match err.disk_error_kind() {
                Some(kind) => format!("{} ({})", err, kind.describe()),
                None => err.to_string(),
            };
            let notice = format!("failed to write log entry: {reason}");
            let notice =
                LogEntry::capture(LogLevel::Error, ctx, &self.default_component, &notice).render();
            let _ = self.writer.write_line(&notice);
        }
    }
}

/// Process logger: leveled calls, rotating file, bridge and crash capture
#[derive(Debug)]
pub struct LogCore {
    dir: PathBuf,
    sink: Arc<LineSink>,
    stream: BridgeWriter,
    bridge: Mutex<Option<StandardLogBridge>>,
    crash_file: Option<PathBuf>,
}

impl LogCore {
    /// Open a logger in `dir` using the redirect and crash hook enabled in `config`
    pub fn open(dir: impl AsRef<Path>, config: &LogConfig) -> Result<Self, LogError> {
        let redirect: Option<&dyn RedirectableSink> = if config.capture_global_logs {
            Some(&TracingSink)
        } else {
            None
        };
        let fault_hook: Option<&dyn FaultHook> = if config.crash_capture {
            Some(&PanicHook)
        } else {
            None
        };
        Self::open_with(dir, config, redirect, fault_hook)
    }

    /// Open a logger in `dir` with an explicit redirect and crash hook
    ///
    /// Fails only if the directory or the log file cannot be created. Redirect and crash
    /// capture failures are written to the log and otherwise ignored.
    pub fn open_with(
        dir: impl AsRef<Path>,
        config: &LogConfig,
        redirect: Option<&dyn RedirectableSink>,
        fault_hook: Option<&dyn FaultHook>,
    ) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| LogError::CreateDirectory {
            path: dir.clone(),
            source,
        })?;

        let writer = RotatingWriter::open(dir.join(LOG_FILE_NAME), config.rotation_policy())?;
        let sink = Arc::new(LineSink {
            writer,
            default_component: config.default_component.clone(),
            dropped: AtomicU64::new(0),
        });

        let (stream, reader) = bridge::byte_stream();
        let bridge_sink = Arc::clone(&sink);
        let bridge = StandardLogBridge::spawn(stream.clone(), reader, move |chunk| {
            let ctx = LogContext::new_trace();
            bridge_sink.log(LogLevel::Info, &ctx, &format!("{SYS_LOG_TAG} {chunk}"));
        })?;

        let mut core = Self {
            dir,
            sink,
            stream,
            bridge: Mutex::new(Some(bridge)),
            crash_file: None,
        };

        if let Some(redirect) = redirect {
            if let Err(e) = redirect.redirect(core.stream.clone()) {
                core.warn(&LogContext::new(), &e.to_string());
            }
        }

        if let Some(hook) = fault_hook {
            match crash::setup(&core.dir, hook) {
                Ok(path) => core.crash_file = Some(path),
                Err(e) => core.error(&LogContext::new(), &e.to_string()),
            }
        }

        Ok(core)
    }

    pub fn debug(&self, ctx: &LogContext, message: &str) {
        self.sink.log(LogLevel::Debug, ctx, message);
    }

    pub fn info(&self, ctx: &LogContext, message: &str) {
        self.sink.log(LogLevel::Info, ctx, message);
    }

    pub fn warn(&self, ctx: &LogContext, message: &str) {
        self.sink.log(LogLevel::Warn, ctx, message);
    }

    pub fn error(&self, ctx: &LogContext, message: &str) {
        self.sink.log(LogLevel::Error, ctx, message);
    }

    /// Log at an explicit level
    pub fn log(&self, level: LogLevel, ctx: &LogContext, message: &str) {
        self.sink.log(level, ctx, message);
    }

    /// Writable handle whose bytes are forwarded as `[SYS LOG]` entries
    pub fn writer(&self) -> BridgeWriter {
        self.stream.clone()
    }

    /// Directory holding the log, its backups and the crash file
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the active log file
    pub fn log_path(&self) -> &Path {
        self.sink.writer.path()
    }

    /// Path of the crash file, if crash capture was wired successfully
    pub fn crash_file(&self) -> Option<&Path> {
        self.crash_file.as_deref()
    }

    /// The underlying rotating writer
    pub fn rotating_writer(&self) -> &RotatingWriter {
        &self.sink.writer
    }

    /// Number of entries that could not be written
    pub fn dropped_lines(&self) -> u64 {
        self.sink.dropped.load(Ordering::Relaxed)
    }

    /// Close the bridge stream, wait for pending bridged output and flush the file
    ///
    /// Leveled calls keep working afterwards; only the bridge stops.
    pub fn shutdown(&self) {
        let bridge = self
            .bridge
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut bridge) = bridge {
            bridge.shutdown();
        }
        let _ = self.sink.writer.flush();
    }
}

/// One-time initialization cell for a [`LogCore`]
///
/// Concurrent first callers block until one of them has finished construction; all of
/// them get the same instance. A failed construction leaves the cell empty.
#[derive(Debug, Default)]
pub struct LoggerCell {
    cell: OnceCell<LogCore>,
}

impl LoggerCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The logger, if it has been initialized
    pub fn get(&self) -> Option<&LogCore> {
        self.cell.get()
    }

    /// Return the logger, constructing it in the resolved directory on first use
    pub fn get_or_init<R>(&self, resolver: &R, config: &LogConfig) -> Result<&LogCore, LogError>
    where
        R: DirectoryResolver + ?Sized,
    {
        self.cell
            .get_or_try_init(|| LogCore::open(resolver.log_dir(), config))
    }
}

static GLOBAL: LoggerCell = LoggerCell::new();

/// Initialize the process-wide logger, or return it if already initialized
pub fn init_global<R>(resolver: &R, config: &LogConfig) -> Result<&'static LogCore, LogError>
where
    R: DirectoryResolver + ?Sized,
{
    GLOBAL.get_or_init(resolver, config)
}

/// The process-wide logger, if initialized
pub fn global() -> Option<&'static LogCore> {
    GLOBAL.get()
}
