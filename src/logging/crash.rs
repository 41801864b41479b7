//! Crash capture
//!
//! Points the runtime's fault report at a dedicated append-only file, separate from the
//! rotating log, so a failure inside the logging pipeline itself still leaves a record.
//! The default [`FaultHook`] is the Rust panic hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, RwLock};

use chrono::Local;

use super::format::{current_thread_id, TIMESTAMP_FORMAT};
use crate::error::CrashError;

/// Name of the crash file inside the log directory
pub const CRASH_FILE_NAME: &str = "crash.log";

/// Append-only destination for crash reports
#[derive(Debug)]
pub struct CrashFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl CrashFile {
    /// Open (or create) the crash file in append mode and make sure it is writable
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CrashError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CrashError::Open {
                path: path.clone(),
                source,
            })?;

        ensure_writable(&file, &path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the crash file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a report and push it to disk
    pub fn write_report(&self, report: &str) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(report.as_bytes())?;
        file.sync_data()
    }
}

#[cfg(unix)]
fn ensure_writable(file: &File, path: &Path) -> Result<(), CrashError> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(0o644))
        .map_err(|source| CrashError::Permission {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn ensure_writable(file: &File, path: &Path) -> Result<(), CrashError> {
    let metadata = file.metadata().map_err(|source| CrashError::Permission {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.permissions().readonly() {
        return Err(CrashError::ReadOnly(path.to_path_buf()));
    }
    Ok(())
}

/// Runtime hook that can receive an emergency write target for fault reports
pub trait FaultHook: Send + Sync {
    /// Make `target` the destination for reports of unrecoverable faults
    fn register(&self, target: CrashFile) -> Result<(), CrashError>;
}

static CRASH_TARGET: RwLock<Option<Arc<CrashFile>>> = RwLock::new(None);
static PANIC_HOOK: Once = Once::new();

/// Writes panic reports to the registered crash file
///
/// The hook is installed once per process and chains to the previously installed hook.
/// Registering again swaps the target file.
///
/// A panic hook runs before unwinding, so every panic is reported, including ones later
/// recovered with `catch_unwind` or contained in a tokio task. Entries in the crash file
/// are therefore not all fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHook;

impl PanicHook {
    /// Currently registered crash file
    pub fn target() -> Option<Arc<CrashFile>> {
        CRASH_TARGET
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FaultHook for PanicHook {
    fn register(&self, target: CrashFile) -> Result<(), CrashError> {
        *CRASH_TARGET.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(target));

        PANIC_HOOK.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                if let Some(target) = PanicHook::target() {
                    let location = info
                        .location()
                        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
                        .unwrap_or_else(|| "unknown location".to_string());
                    let backtrace = Backtrace::force_capture();
                    let report = render_report(&location, info.payload(), &backtrace);
                    let _ = target.write_report(&report);
                }
                previous(info);
            }));
        });

        Ok(())
    }
}

/// Text written for one fault
pub fn render_report(
    location: &str,
    payload: &(dyn Any + Send),
    backtrace: &Backtrace,
) -> String {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    format!(
        "{} G{:07} [CRASH] thread '{}' panicked at {}: {}\n{}\n\n",
        Local::now().format(TIMESTAMP_FORMAT),
        current_thread_id(),
        thread_name,
        location,
        payload_text(payload),
        backtrace
    )
}

fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Open the crash file in `dir` and register it with `hook`
///
/// Returns the crash file path on success.
pub fn setup(dir: &Path, hook: &dyn FaultHook) -> Result<PathBuf, CrashError> {
    let target = CrashFile::open(dir.join(CRASH_FILE_NAME))?;
    let path = target.path().to_path_buf();
    hook.register(target)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct RecordingHook {
        registered: Mutex<Vec<PathBuf>>,
    }

    impl FaultHook for RecordingHook {
        fn register(&self, target: CrashFile) -> Result<(), CrashError> {
            self.registered
                .lock()
                .unwrap()
                .push(target.path().to_path_buf());
            Ok(())
        }
    }

    struct RefusingHook;

    impl FaultHook for RefusingHook {
        fn register(&self, _target: CrashFile) -> Result<(), CrashError> {
            Err(CrashError::Register("unsupported runtime".to_string()))
        }
    }

    #[test]
    fn test_open_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CRASH_FILE_NAME);
        std::fs::write(&path, "earlier crash\n").unwrap();

        let crash = CrashFile::open(&path).unwrap();
        crash.write_report("later crash\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier crash\nlater crash\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_open_sets_owner_read_write() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CRASH_FILE_NAME);
        CrashFile::open(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_open_fails_on_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CRASH_FILE_NAME);
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(CrashFile::open(&path), Err(CrashError::Open { .. })));
    }

    #[test]
    fn test_setup_registers_crash_file() {
        let temp_dir = TempDir::new().unwrap();
        let hook = RecordingHook {
            registered: Mutex::new(Vec::new()),
        };

        let path = setup(temp_dir.path(), &hook).unwrap();

        assert_eq!(path, temp_dir.path().join(CRASH_FILE_NAME));
        assert_eq!(*hook.registered.lock().unwrap(), vec![path.clone()]);
        assert!(path.exists());
    }

    #[test]
    fn test_setup_reports_registration_failure() {
        let temp_dir = TempDir::new().unwrap();
        let err = setup(temp_dir.path(), &RefusingHook).unwrap_err();
        assert!(err.to_string().contains("unsupported runtime"));
    }

    #[test]
    fn test_render_report() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let report = render_report("src/lib.rs:1:1", payload.as_ref(), &Backtrace::disabled());

        assert!(report.contains("[CRASH]"));
        assert!(report.contains("panicked at src/lib.rs:1:1: boom"));
        assert!(report.ends_with("\n\n"));
    }

    #[test]
    fn test_payload_text() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(payload_text(owned.as_ref()), "owned");
        assert_eq!(payload_text(other.as_ref()), "non-string panic payload");
    }
}
