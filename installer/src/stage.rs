//! Stages an artifact passes through and the paths that realise them.
//!
//! Every path the pipeline touches is derived from a [`StageLayout`]. The
//! layout is built once from explicit inputs and is never influenced by the
//! process working directory.

use crate::catalog::ModuleName;
use crate::descriptor::ArtifactKind;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::fmt;

/// Location an artifact can occupy, in promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// The module's own build tree.
    BuildOutput,
    /// The active project's local staging tree.
    LocalStaging,
    /// The shared system installation root.
    SystemRoot,
    /// The shared library location holding aliases.
    AliasLocation,
}

impl Stage {
    /// The stage following this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::BuildOutput => Some(Self::LocalStaging),
            Self::LocalStaging => Some(Self::SystemRoot),
            Self::SystemRoot => Some(Self::AliasLocation),
            Self::AliasLocation => None,
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildOutput => "build output",
            Self::LocalStaging => "local staging",
            Self::SystemRoot => "system root",
            Self::AliasLocation => "alias location",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default system installation root.
pub const DEFAULT_SYSTEM_ROOT: &str = "/usr/local/jamoma";

/// Default shared library location for aliases.
pub const DEFAULT_ALIAS_DIR: &str = "/usr/local/lib";

/// Directory below the staging root holding per-module manifests.
pub const MANIFEST_DIR: &str = ".manifests";

/// Absolute paths of every stage for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLayout {
    /// The active module.
    pub project: ModuleName,
    /// The active module's project directory (its build output).
    pub project_dir: Utf8PathBuf,
    /// Directory holding sibling module checkouts.
    pub workspace_dir: Utf8PathBuf,
    /// Local staging root of the active project.
    pub staging_root: Utf8PathBuf,
    /// Shared system installation root.
    pub system_root: Utf8PathBuf,
    /// Shared library location for aliases.
    pub alias_dir: Utf8PathBuf,
}

impl StageLayout {
    /// Layout with the conventional locations for `project_dir`.
    ///
    /// Sibling modules live next to the project, staging goes to
    /// `<project>/support/jamoma` and the system locations are the
    /// `/usr/local` defaults.
    #[must_use]
    pub fn conventional(project: ModuleName, project_dir: &Utf8Path) -> Self {
        let workspace_dir = project_dir
            .parent()
            .map_or_else(|| project_dir.to_owned(), Utf8Path::to_owned);
        Self {
            project,
            project_dir: project_dir.to_owned(),
            workspace_dir,
            staging_root: default_staging_root(project_dir),
            system_root: Utf8PathBuf::from(DEFAULT_SYSTEM_ROOT),
            alias_dir: Utf8PathBuf::from(DEFAULT_ALIAS_DIR),
        }
    }

    /// Build output directory for `module`.
    ///
    /// The active module builds in place; upstream modules are sibling
    /// checkouts named after the module.
    #[must_use]
    pub fn build_output_dir(&self, module: &ModuleName) -> Utf8PathBuf {
        if module == &self.project {
            self.project_dir.clone()
        } else {
            self.workspace_dir.join(module.as_str())
        }
    }

    /// Root directory of `stage` for `module`.
    #[must_use]
    pub fn stage_root(&self, stage: Stage, module: &ModuleName) -> Utf8PathBuf {
        match stage {
            Stage::BuildOutput => self.build_output_dir(module),
            Stage::LocalStaging => self.staging_root.clone(),
            Stage::SystemRoot => self.system_root.clone(),
            Stage::AliasLocation => self.alias_dir.clone(),
        }
    }

    /// Destination directory of `kind` within a stage root.
    #[must_use]
    pub fn subtree(root: &Utf8Path, kind: ArtifactKind) -> Utf8PathBuf {
        root.join(kind.subtree())
    }

    /// Location of the staging manifest for `module`.
    #[must_use]
    pub fn manifest_path(&self, module: &ModuleName) -> Utf8PathBuf {
        self.staging_root
            .join(MANIFEST_DIR)
            .join(format!("{module}.json"))
    }
}

/// Conventional local staging root for a project directory.
#[must_use]
pub fn default_staging_root(project_dir: &Utf8Path) -> Utf8PathBuf {
    project_dir.join("support").join("jamoma")
}
