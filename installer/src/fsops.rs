//! Typed filesystem primitives shared by the promoter, root manager and
//! linker.
//!
//! Raw [`std::io::Error`]s are classified into [`FsFailure`] first so callers
//! can decide whether a failure is a missing input (a warning) or fatal.

use crate::error::InstallerError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io;
use thiserror::Error;

/// A classified filesystem failure.
#[derive(Debug, Error)]
pub enum FsFailure {
    /// The path does not exist.
    #[error("{path} does not exist")]
    NotFound {
        /// The missing path.
        path: Utf8PathBuf,
    },
    /// The process may not access the path.
    #[error("permission denied for {path}")]
    PermissionDenied {
        /// The inaccessible path.
        path: Utf8PathBuf,
    },
    /// Any other I/O failure.
    #[error("{path}: {source}")]
    Other {
        /// The path being operated on.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl FsFailure {
    /// Classify `err`, raised while operating on `path`.
    #[must_use]
    pub fn classify(err: io::Error, path: &Utf8Path) -> Self {
        let owned = path.to_owned();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path: owned },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: owned },
            _ => Self::Other {
                path: owned,
                source: err,
            },
        }
    }

    /// Whether the failure is a missing path.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convert into the fatal installer error for `operation`.
    ///
    /// Permission problems keep their own variant so the elevation hint is
    /// shown; everything else is reported as a staging failure.
    #[must_use]
    pub fn into_error(self, operation: &'static str) -> InstallerError {
        match self {
            Self::PermissionDenied { path } => InstallerError::PermissionDenied { path, operation },
            other => InstallerError::StagingFailed {
                reason: format!("{operation}: {other}"),
            },
        }
    }
}

/// Result of a classified filesystem operation.
pub type FsResult<T> = std::result::Result<T, FsFailure>;

/// Copy `src` to `dest`, replacing `dest` if present.
///
/// Permission bits are carried over by the copy and the modification time is
/// set to the source's afterwards. A symlink or file already at `dest` is
/// removed first so the copy never writes through a link.
///
/// # Errors
///
/// Returns the classified failure of whichever step failed.
pub fn copy_preserving(src: &Utf8Path, dest: &Utf8Path) -> FsResult<u64> {
    let metadata = fs::metadata(src).map_err(|e| FsFailure::classify(e, src))?;

    match fs::symlink_metadata(dest) {
        Ok(existing) if !existing.is_dir() => {
            fs::remove_file(dest).map_err(|e| FsFailure::classify(e, dest))?;
        }
        Ok(_) => {
            return Err(FsFailure::Other {
                path: dest.to_owned(),
                source: io::Error::other("a directory is in the way"),
            });
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(FsFailure::classify(err, dest)),
    }

    let bytes = fs::copy(src, dest).map_err(|e| FsFailure::classify(e, dest))?;

    // A read-only source yields a read-only copy, which cannot be reopened
    // for writing; the timestamp is then left as copied.
    if let Ok(modified) = metadata.modified()
        && let Err(err) = File::options()
            .write(true)
            .open(dest)
            .and_then(|file| file.set_modified(modified))
    {
        log::debug!("could not preserve modification time of {dest}: {err}");
    }

    Ok(bytes)
}

/// Create `dir` and any missing parents.
///
/// # Errors
///
/// Returns the classified failure if the directory cannot be created.
pub fn ensure_dir(dir: &Utf8Path) -> FsResult<()> {
    fs::create_dir_all(dir).map_err(|e| FsFailure::classify(e, dir))
}

/// Remove `path`, whatever it is. Symlinks are removed, never followed.
///
/// A path that is already gone counts as removed.
///
/// # Errors
///
/// Returns the classified failure for anything other than a missing path.
pub fn remove_entry(path: &Utf8Path) -> FsResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(FsFailure::classify(err, path)),
    };

    let removal = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removal {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(FsFailure::classify(err, path)),
    }
}

/// Entries directly inside `dir`, sorted. A missing directory has none.
///
/// # Errors
///
/// Returns the classified failure if the directory cannot be read.
pub fn list_dir(dir: &Utf8Path) -> FsResult<Vec<Utf8PathBuf>> {
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(FsFailure::classify(err, dir)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        paths.push(entry.map_err(|e| FsFailure::classify(e, dir))?.into_path());
    }
    paths.sort();
    Ok(paths)
}
