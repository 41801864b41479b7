//! Size-rotated log file writer
//!
//! [`RotatingWriter`] appends to a single active file. When a write would push the file
//! past the configured size, the file is renamed to a timestamped backup and a fresh one
//! is opened under the same name before the write lands. Every rotation also prunes
//! backups by age and count.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::retention::{prune_backups, BackupNaming};
use crate::error::LogError;

const MEGABYTE: u64 = 1024 * 1024;

/// Size limit used when a policy leaves it at zero
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 500 * MEGABYTE;

/// Rotation limits, fixed once the writer is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Maximum size of the active file before it is rotated (0 uses the default size)
    pub max_size_bytes: u64,
    /// Backups older than this are deleted on rotation (0 keeps them forever)
    pub max_age_days: u64,
    /// Maximum number of backups kept (0 keeps all)
    pub max_backups: usize,
    /// Use local time instead of UTC in backup names
    pub local_time: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_age_days: 3,
            max_backups: 0,
            local_time: true,
        }
    }
}

#[derive(Debug, Default)]
struct WriterState {
    file: Option<File>,
    size: u64,
}

/// Append-only file writer with size-based rotation
///
/// All writes go through an internal lock, so each call lands as a whole either before or
/// after any other.
#[derive(Debug)]
pub struct RotatingWriter {
    path: PathBuf,
    policy: RotationPolicy,
    naming: BackupNaming,
    state: Mutex<WriterState>,
}

impl RotatingWriter {
    /// Open the active file at `path`, appending to it if it still has room
    pub fn open(path: impl Into<PathBuf>, mut policy: RotationPolicy) -> Result<Self, LogError> {
        let path = path.into();
        if policy.max_size_bytes == 0 {
            policy.max_size_bytes = DEFAULT_MAX_SIZE_BYTES;
        }
        let naming = BackupNaming::for_active_file(&path, policy.local_time);
        let writer = Self {
            path,
            policy,
            naming,
            state: Mutex::new(WriterState::default()),
        };

        {
            let mut state = writer.lock();
            writer.open_existing_or_new(&mut state, 0)?;
        }

        Ok(writer)
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotation limits in effect
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Bytes written to the active file so far
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    /// Append `buf` as one unit, rotating first if it would not fit
    pub fn write(&self, buf: &[u8]) -> Result<usize, LogError> {
        let len = buf.len() as u64;
        if len > self.policy.max_size_bytes {
            return Err(LogError::WriteTooLarge {
                len,
                max: self.policy.max_size_bytes,
            });
        }

        let mut state = self.lock();
        if state.file.is_none() {
            self.open_existing_or_new(&mut state, len)?;
        }
        if state.size + len > self.policy.max_size_bytes {
            self.rotate_locked(&mut state)?;
        }

        let start = state.size;
        let file = match state.file.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        };
        if let Err(failed) = append_whole(file, buf, start) {
            if !failed.rolled_back {
                // Length on disk is unknown; the next write reopens and re-reads it
                state.file = None;
            }
            return Err(failed.source.into());
        }
        state.size += len;

        Ok(buf.len())
    }

    /// Append `line` followed by a newline in a single write
    pub fn write_line(&self, line: &str) -> Result<(), LogError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write(&buf).map(|_| ())
    }

    /// Force a rotation regardless of the current size
    pub fn rotate(&self) -> Result<(), LogError> {
        let mut state = self.lock();
        self.rotate_locked(&mut state)
    }

    /// Run a retention pass over existing backups
    ///
    /// Returns the number of files deleted.
    pub fn cleanup(&self) -> Result<usize, LogError> {
        prune_backups(
            &self.naming,
            self.policy.max_backups,
            self.policy.max_age_days,
            Utc::now(),
        )
    }

    /// Flush and close the active file; the next write reopens it
    pub fn close(&self) -> Result<(), LogError> {
        let mut state = self.lock();
        if let Some(mut file) = state.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush buffered data to disk
    pub fn flush(&self) -> Result<(), LogError> {
        if let Some(file) = self.lock().file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_existing_or_new(
        &self,
        state: &mut WriterState,
        write_len: u64,
    ) -> Result<(), LogError> {
        let existing = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.open_new(state),
            Err(source) => {
                return Err(LogError::OpenLogFile {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if existing + write_len > self.policy.max_size_bytes {
            return self.rotate_locked(state);
        }

        match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                state.file = Some(file);
                state.size = existing;
                Ok(())
            }
            // Fall back to a fresh file if the existing one can't be appended to
            Err(_) => self.open_new(state),
        }
    }

    fn open_new(&self, state: &mut WriterState) -> Result<(), LogError> {
        if self.path.exists() {
            let backup = self.naming.unused_path_for(Utc::now());
            fs::rename(&self.path, &backup).map_err(|source| LogError::Rotate {
                path: self.path.clone(),
                source,
            })?;
            tracing::debug!(backup = %backup.display(), "Rotated log file");
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| LogError::OpenLogFile {
                path: self.path.clone(),
                source,
            })?;

        state.file = Some(file);
        state.size = 0;
        Ok(())
    }

    fn rotate_locked(&self, state: &mut WriterState) -> Result<(), LogError> {
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }
        self.open_new(state)?;

        match self.cleanup() {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "Removed expired log backups"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune log backups"),
        }
        Ok(())
    }
}

/// Destination that can be cut back to an earlier length
trait Truncate: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

struct FailedAppend {
    source: io::Error,
    rolled_back: bool,
}

/// Write all of `buf` after `start`, cutting off a partially written line on failure
fn append_whole<W: Truncate>(out: &mut W, buf: &[u8], start: u64) -> Result<(), FailedAppend> {
    out.write_all(buf).map_err(|source| FailedAppend {
        source,
        rolled_back: out.truncate_to(start).is_ok(),
    })
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(*self, buf).map_err(into_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(*self).map_err(into_io_error)
    }
}

fn into_io_error(err: LogError) -> io::Error {
    match err {
        LogError::Io(e) => e,
        other => io::Error::other(other),
    }
}
