//! Exclusive advisory lock over the installation root.
//!
//! The system root and alias location are shared by every project, so two
//! concurrent installs would interleave their wipes and copies. The lock is
//! non-blocking: a second installer fails fast and names the holder.

use crate::error::{InstallerError, Result};
use crate::fsops;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lock file name inside the installation root.
pub const LOCK_FILENAME: &str = ".jamoma-installer.lock";

/// Who holds the lock, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Process id of the holder.
    pub pid: u32,
    /// Seconds since the Unix epoch when the lock was taken.
    pub started_at_unix: u64,
    /// Command the holder is running.
    pub command: String,
}

impl LockMetadata {
    fn describe(&self) -> String {
        format!(
            "`{}` (pid {}, started at Unix time {})",
            self.command, self.pid, self.started_at_unix
        )
    }
}

/// A held installation lock, released on drop.
#[derive(Debug)]
pub struct InstallLock {
    _file: File,
    path: Utf8PathBuf,
}

impl InstallLock {
    /// Take the lock for `root`, recording `command` as the holder.
    ///
    /// Stale lock files are never unlinked; the advisory lock on the open
    /// handle is what matters, and it dies with its process.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::LockContention`] if another process holds
    /// the lock, and [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] if the lock file cannot be opened.
    pub fn acquire(root: &Utf8Path, command: &str) -> Result<Self> {
        fsops::ensure_dir(root).map_err(|e| e.into_error("locking"))?;
        let path = root.join(LOCK_FILENAME);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| fsops::FsFailure::classify(err, &path).into_error("locking"))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                return Err(InstallerError::LockContention {
                    holder: read_holder(&path),
                    path,
                });
            }
            return Err(fsops::FsFailure::classify(err, &path).into_error("locking"));
        }

        write_metadata(&file, command)
            .map_err(|err| fsops::FsFailure::classify(err, &path).into_error("locking"))?;
        log::debug!("acquired installation lock {path}");

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn write_metadata(file: &File, command: &str) -> io::Result<()> {
    let metadata = LockMetadata {
        pid: std::process::id(),
        started_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs()),
        command: command.to_owned(),
    };

    file.set_len(0)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata).map_err(io::Error::other)?;
    writer.flush()
}

fn read_holder(path: &Utf8Path) -> String {
    fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok())
        .map_or_else(|| "another installer".to_owned(), |meta| meta.describe())
}
