//! Directory resolution abstraction for per-user paths.
//!
//! The installer only needs the user configuration directory, but looking it
//! up through a trait keeps configuration discovery testable without touching
//! the real home directory.

use directories_next::ProjectDirs;
use std::path::PathBuf;

/// Per-user base directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Directory holding the installer's user configuration, if known.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the platform conventions of `directories-next`.
///
/// On macOS this is `~/Library/Application Support/org.Jamoma.jamoma-installer`,
/// on Linux `$XDG_CONFIG_HOME/jamoma-installer`.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    project: ProjectDirs,
}

impl SystemBaseDirs {
    /// Resolve the directories for the current user.
    ///
    /// Returns `None` when no home directory can be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        ProjectDirs::from("org", "Jamoma", "jamoma-installer").map(|project| Self { project })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        Some(self.project.config_dir().to_path_buf())
    }
}

/// [`BaseDirs`] that knows no directories, for hosts without a home.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBaseDirs;

impl BaseDirs for NoBaseDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        None
    }
}
