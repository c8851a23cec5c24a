//! Staging manifests record what a module left in the local staging tree.
//!
//! The manifest is written after a successful BuildOutput to LocalStaging
//! promotion and read when promoting onwards, so the system root receives
//! exactly the files this module staged even though every module shares the
//! same staging subtrees.

use crate::catalog::ModuleName;
use crate::descriptor::ArtifactKind;
use crate::error::{InstallerError, Result};
use crate::fsops;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Files staged for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedDescriptor {
    /// Artifact kind, which decides the subtree.
    pub kind: ArtifactKind,
    /// Expanded source pattern the files came from.
    pub pattern: String,
    /// Whether the descriptor is optional.
    #[serde(default)]
    pub optional: bool,
    /// File names inside the kind's subtree.
    pub files: Vec<String>,
}

/// Per-module record of staged files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingManifest {
    /// The module the files belong to.
    pub module: ModuleName,
    /// One entry per descriptor, including those that matched nothing.
    pub artifacts: Vec<StagedDescriptor>,
}

impl StagingManifest {
    /// Create an empty manifest for `module`.
    #[must_use]
    pub const fn new(module: ModuleName) -> Self {
        Self {
            module,
            artifacts: Vec::new(),
        }
    }

    /// Total number of staged files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.artifacts.iter().map(|entry| entry.files.len()).sum()
    }

    /// Read the manifest at `path`, or `None` if the module was never staged.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::StagingFailed`] for an unreadable or corrupt
    /// manifest.
    pub fn load(path: &Utf8Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(fsops::FsFailure::classify(err, path).into_error("reading manifest"));
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| InstallerError::StagingFailed {
                reason: format!("corrupt staging manifest {path}: {err}"),
            })
    }

    /// Write the manifest to `path`, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] if the file cannot be written.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fsops::ensure_dir(parent).map_err(|e| e.into_error("writing manifest"))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            InstallerError::StagingFailed {
                reason: format!("could not serialise staging manifest: {err}"),
            }
        })?;
        fs::write(path, json)
            .map_err(|err| fsops::FsFailure::classify(err, path).into_error("writing manifest"))
    }
}
