//! Database backup and restore.
//!
//! A backup is a raw byte copy of the live database file, never a
//! database-level export. The two most recent backups are tracked inside the
//! database itself (see [`crate::core::appinfo`]); the history is shifted
//! durably before the copy starts and compensated if the copy fails, so it
//! never describes a backup that does not exist on disk.

use crate::core::appinfo;
use crate::db::{DbFile, StorageAdapter};
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The raw file-copy primitive, injectable so copy failure is testable.
pub trait FileCopy {
    /// Copy `from` to `to` byte-for-byte, returning the bytes written.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// Filesystem-backed copy, the production implementation.
pub struct FsCopy;

impl FileCopy for FsCopy {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }
}

/// Sort direction for backup listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One tracked backup generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub file: String,
    pub time: String,
    /// Directory is tracked for the latest generation only.
    pub dir: Option<String>,
}

/// The two tracked backup generations.
#[derive(Debug, Clone, Serialize)]
pub struct BackupHistory {
    pub this: Option<BackupRecord>,
    pub previous: Option<BackupRecord>,
}

/// Decode the backup history from the app_info entries.
pub fn read_history(adapter: &mut dyn StorageAdapter) -> Result<BackupHistory> {
    let this_file = appinfo::get(adapter, appinfo::DB_BACKUP_THISFILE)?;
    let this_time = appinfo::get(adapter, appinfo::DB_BACKUP_THISTIME)?;
    let this_dir = appinfo::get(adapter, appinfo::DB_BACKUP_THISDIR)?;
    let prev_file = appinfo::get(adapter, appinfo::DB_BACKUP_PREVFILE)?;
    let prev_time = appinfo::get(adapter, appinfo::DB_BACKUP_PREVTIME)?;

    let this = match (this_file, this_time) {
        (Some(file), Some(time)) => Some(BackupRecord {
            file,
            time,
            dir: this_dir,
        }),
        _ => None,
    };
    let previous = match (prev_file, prev_time) {
        (Some(file), Some(time)) => Some(BackupRecord {
            file,
            time,
            dir: None,
        }),
        _ => None,
    };
    Ok(BackupHistory { this, previous })
}

/// File name for a backup taken at the given moment.
pub fn backup_file_name(now: &DateTime<Local>) -> String {
    format!("db-{}.bak", now.format("%Y%m%d-%H%M"))
}

/// Exact pre-shift state of the five history keys, kept for compensation.
struct HistorySnapshot {
    this_file: Option<String>,
    this_time: Option<String>,
    this_dir: Option<String>,
    prev_file: Option<String>,
    prev_time: Option<String>,
}

impl HistorySnapshot {
    fn read(adapter: &mut dyn StorageAdapter) -> Result<Self> {
        Ok(Self {
            this_file: appinfo::get(adapter, appinfo::DB_BACKUP_THISFILE)?,
            this_time: appinfo::get(adapter, appinfo::DB_BACKUP_THISTIME)?,
            this_dir: appinfo::get(adapter, appinfo::DB_BACKUP_THISDIR)?,
            prev_file: appinfo::get(adapter, appinfo::DB_BACKUP_PREVFILE)?,
            prev_time: appinfo::get(adapter, appinfo::DB_BACKUP_PREVTIME)?,
        })
    }

    /// Put every key back to its snapshotted value, deleting keys that did
    /// not exist before the shift.
    fn restore(&self, adapter: &mut dyn StorageAdapter) -> Result<()> {
        appinfo::put_opt(adapter, appinfo::DB_BACKUP_THISFILE, self.this_file.as_deref())?;
        appinfo::put_opt(adapter, appinfo::DB_BACKUP_THISTIME, self.this_time.as_deref())?;
        appinfo::put_opt(adapter, appinfo::DB_BACKUP_THISDIR, self.this_dir.as_deref())?;
        appinfo::put_opt(adapter, appinfo::DB_BACKUP_PREVFILE, self.prev_file.as_deref())?;
        appinfo::put_opt(adapter, appinfo::DB_BACKUP_PREVTIME, self.prev_time.as_deref())?;
        Ok(())
    }
}

/// Performs backups of one live database file and keeps the in-database
/// history honest.
pub struct BackupCoordinator {
    db: DbFile,
    backup_dir: PathBuf,
    copier: Box<dyn FileCopy>,
}

impl BackupCoordinator {
    /// Coordinator for the given live database and default backup directory.
    pub fn new<P: AsRef<Path>>(db: DbFile, backup_dir: P) -> Self {
        Self {
            db,
            backup_dir: backup_dir.as_ref().to_path_buf(),
            copier: Box::new(FsCopy),
        }
    }

    /// Replace the file-copy primitive.
    pub fn with_copier(mut self, copier: Box<dyn FileCopy>) -> Self {
        self.copier = copier;
        self
    }

    /// The default backup directory.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up into the default directory.
    pub fn backup(&self) -> Result<PathBuf> {
        self.backup_into(&self.backup_dir)
    }

    /// Back up into an explicit destination directory.
    pub fn backup_to(&self, dest: &Path) -> Result<PathBuf> {
        self.backup_into(dest)
    }

    fn backup_into(&self, dest: &Path) -> Result<PathBuf> {
        let mut adapter = self.db.open()?;

        let shifted = (|| -> Result<(PathBuf, PathBuf, HistorySnapshot)> {
            let live_path = adapter.file_path().to_path_buf();

            if dest.exists() {
                if !dest.is_dir() {
                    return Err(Error::argument(format!(
                        "backup destination {} is not a directory",
                        dest.display()
                    )));
                }
            } else {
                fs::create_dir_all(dest)?;
            }

            let now = Local::now();
            let file_name = backup_file_name(&now);
            let target = dest.join(&file_name);

            // Shift the generations durably before copying, so the
            // compensation path always has a known prior state.
            let snapshot = HistorySnapshot::read(adapter.as_mut())?;
            if let (Some(file), Some(time)) = (&snapshot.this_file, &snapshot.this_time) {
                appinfo::put(adapter.as_mut(), appinfo::DB_BACKUP_PREVFILE, file)?;
                appinfo::put(adapter.as_mut(), appinfo::DB_BACKUP_PREVTIME, time)?;
            }
            appinfo::put(
                adapter.as_mut(),
                appinfo::DB_BACKUP_THISDIR,
                &dest.to_string_lossy(),
            )?;
            appinfo::put(adapter.as_mut(), appinfo::DB_BACKUP_THISFILE, &file_name)?;
            appinfo::put(
                adapter.as_mut(),
                appinfo::DB_BACKUP_THISTIME,
                &now.format("%Y-%m-%d %H:%M").to_string(),
            )?;

            Ok((live_path, target, snapshot))
        })();

        let (live_path, target, snapshot) = match shifted {
            Ok(value) => value,
            Err(err) => {
                let _ = adapter.close();
                return Err(err);
            }
        };

        // The live file must not be open during the raw copy.
        adapter.close()?;

        match self.copier.copy(&live_path, &target) {
            Ok(bytes) => {
                tracing::info!(path = %target.display(), bytes, "backup written");
                Ok(target)
            }
            Err(io_err) => {
                // Compensate: the history must not describe a backup that is
                // not on disk. A failure here is logged but must not mask the
                // original copy failure.
                match self.db.open() {
                    Ok(mut adapter) => {
                        if let Err(comp_err) = snapshot.restore(adapter.as_mut()) {
                            tracing::warn!(error = %comp_err, "backup history compensation failed");
                        }
                        let _ = adapter.close();
                    }
                    Err(open_err) => {
                        tracing::warn!(error = %open_err, "could not reopen database to compensate");
                    }
                }
                Err(Error::BackupIo {
                    message: format!("copy to {} failed", target.display()),
                    source: io_err,
                })
            }
        }
    }

    /// Overwrite the live database file with a backup's bytes.
    ///
    /// Any adapter on the live path must be closed by the caller first. A
    /// restored file from an older software version is upgraded by the normal
    /// open path, not here; [`crate::db::read_schema_version`] judges
    /// compatibility beforehand.
    pub fn restore(&self, backup_file: &Path) -> Result<()> {
        if !backup_file.is_file() {
            return Err(Error::BackupIo {
                message: format!("backup file {} does not exist", backup_file.display()),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        self.copier
            .copy(backup_file, self.db.path())
            .map_err(|io_err| Error::BackupIo {
                message: format!("restore from {} failed", backup_file.display()),
                source: io_err,
            })?;
        tracing::info!(path = %backup_file.display(), "database restored");
        Ok(())
    }

    /// File names in a backup directory, optionally regex-filtered, sorted
    /// case-insensitively. With no explicit order, the coordinator's own
    /// directory lists most-recent-first (descending) and an explicit
    /// directory lists ascending.
    pub fn list_backups(
        &self,
        dir: Option<&Path>,
        pattern: Option<&str>,
        order: Option<SortOrder>,
    ) -> Result<Vec<String>> {
        let custom = dir.is_some();
        let dir = dir.unwrap_or(&self.backup_dir);
        let filter = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|err| Error::argument(format!("invalid filter pattern: {err}")))?;

        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
                continue;
            }
            names.push(name);
        }

        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
        let order = order.unwrap_or(if custom {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        });
        if order == SortOrder::Descending {
            names.reverse();
        }
        Ok(names)
    }
}
