//! Rotated log file naming and retention
//!
//! Backups are named `<stem>-<timestamp><ext>` next to the active file. The timestamp is
//! parsed back out of the name to decide which backups have aged out.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};

use crate::error::LogError;

/// Timestamp layout embedded in backup file names
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// A rotated log file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Naming scheme for backups of one active log file
#[derive(Debug, Clone)]
pub struct BackupNaming {
    dir: PathBuf,
    prefix: String,
    ext: String,
    local_time: bool,
}

impl BackupNaming {
    /// Derive the naming scheme from the active file path
    pub fn for_active_file(path: &Path, local_time: bool) -> Self {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        Self {
            dir,
            prefix: format!("{stem}-"),
            ext,
            local_time,
        }
    }

    /// Backup path for a rotation happening at `at`
    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        let stamp = if self.local_time {
            at.with_timezone(&Local).format(BACKUP_TIME_FORMAT).to_string()
        } else {
            at.format(BACKUP_TIME_FORMAT).to_string()
        };
        self.dir.join(format!("{}{}{}", self.prefix, stamp, self.ext))
    }

    /// Backup path for `at` that does not exist yet
    ///
    /// Two rotations in the same millisecond would collide, so the timestamp is nudged
    /// forward until the name is free.
    pub fn unused_path_for(&self, at: DateTime<Utc>) -> PathBuf {
        let mut at = at;
        let mut candidate = self.path_for(at);
        while candidate.exists() {
            at += Duration::milliseconds(1);
            candidate = self.path_for(at);
        }
        candidate
    }

    /// Parse the rotation time out of a backup file name
    pub fn timestamp_of(&self, file_name: &str) -> Option<DateTime<Utc>> {
        let stamp = file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(self.ext.as_str())?;
        let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()?;
        if self.local_time {
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
        } else {
            Some(Utc.from_utc_datetime(&naive))
        }
    }

    /// List backups in the log directory, newest first
    pub fn list(&self) -> Result<Vec<BackupFile>, LogError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(timestamp) = self.timestamp_of(name) {
                backups.push(BackupFile {
                    path: entry.path(),
                    timestamp,
                });
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }
}

/// Remove backups beyond `max_backups` or older than `max_age_days`
///
/// A limit of zero disables that rule. Returns the number of files deleted.
pub fn prune_backups(
    naming: &BackupNaming,
    max_backups: usize,
    max_age_days: u64,
    now: DateTime<Utc>,
) -> Result<usize, LogError> {
    let backups = naming.list()?;

    let cutoff = age_cutoff(max_age_days, now);

    let mut deleted_count = 0;
    for (index, backup) in backups.iter().enumerate() {
        let over_count = max_backups > 0 && index >= max_backups;
        let too_old = cutoff.is_some_and(|cutoff| backup.timestamp < cutoff);
        if (over_count || too_old) && fs::remove_file(&backup.path).is_ok() {
            deleted_count += 1;
        }
    }

    Ok(deleted_count)
}

/// Oldest backup time still kept, or `None` when no age limit applies
///
/// Ages too large to represent as a date are treated as unlimited.
fn age_cutoff(max_age_days: u64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if max_age_days == 0 {
        return None;
    }
    i64::try_from(max_age_days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|age| now.checked_sub_signed(age))
}
