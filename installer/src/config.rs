//! Installer configuration.
//!
//! Configuration is optional TOML, read once at start-up. Lookup order is an
//! explicit `--config` path, then `jamoma-installer.toml` in the project
//! directory, then `config.toml` in the user configuration directory. Any
//! key left out keeps its built-in default.
//!
//! ```toml
//! system_root = "/usr/local/jamoma"
//! alias_dir = "/usr/local/lib"
//! jobs = 4
//!
//! [build]
//! command = ["ruby", "build.rb", "Release"]
//! timeout_secs = 3600
//! ```

use crate::catalog::{Catalog, Module, ModuleName};
use crate::descriptor::ArtifactDescriptor;
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::platform::PlatformKind;
use crate::stage::StageLayout;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;

/// Configuration file name looked up in the project directory.
pub const CONFIG_FILENAME: &str = "jamoma-installer.toml";

/// Configuration file name looked up in the user configuration directory.
pub const USER_CONFIG_FILENAME: &str = "config.toml";

/// Environment variable naming the active module.
pub const PROJECT_ENV_VAR: &str = "JAMOMAPROJECT";

/// Default limit on one run of the external build command.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 30 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Active module name, below `--project` and `JAMOMAPROJECT`.
    pub project: Option<String>,
    /// Directory holding sibling module checkouts.
    pub workspace_dir: Option<Utf8PathBuf>,
    /// Local staging root.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Shared system installation root.
    pub system_root: Option<Utf8PathBuf>,
    /// Shared library location for aliases.
    pub alias_dir: Option<Utf8PathBuf>,
    /// Platform to assume instead of the host's.
    pub platform: Option<PlatformKind>,
    /// Copy worker threads per module.
    pub jobs: Option<usize>,
    /// External build step.
    pub build: BuildSettings,
    /// Module table replacing the built-in suite when non-empty.
    pub modules: Vec<ModuleConfig>,
}

/// How to run the external build step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Program and arguments.
    pub command: Vec<String>,
    /// Working directory, relative to the project directory.
    pub working_dir: Utf8PathBuf,
    /// Seconds before the build is killed.
    pub timeout_secs: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: vec!["ruby".to_owned(), "build.rb".to_owned()],
            working_dir: Utf8PathBuf::from("support"),
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
        }
    }
}

impl BuildSettings {
    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One `[[modules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Module name.
    pub name: ModuleName,
    /// Ordering priority.
    #[serde(default)]
    pub priority: u32,
    /// Modules this one depends on.
    #[serde(default)]
    pub depends_on: Vec<ModuleName>,
    /// Produced artifacts.
    #[serde(default)]
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl From<ModuleConfig> for Module {
    fn from(config: ModuleConfig) -> Self {
        Self {
            name: config.name,
            priority: config.priority,
            depends_on: config.depends_on,
            artifacts: config.artifacts,
        }
    }
}

/// A configuration together with the file it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: InstallerConfig,
    /// The file it was read from, or `None` for built-in defaults.
    pub source: Option<Utf8PathBuf>,
}

impl InstallerConfig {
    /// Parse and validate configuration text read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidConfig`] for malformed TOML, unknown
    /// keys, an empty build command or a zero job count.
    pub fn parse(contents: &str, path: &Utf8Path) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| InstallerError::InvalidConfig {
            path: path.to_owned(),
            reason: err.message().to_owned(),
        })?;

        let invalid = |reason: &str| InstallerError::InvalidConfig {
            path: path.to_owned(),
            reason: reason.to_owned(),
        };
        if config
            .build
            .command
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(invalid("build.command must name a program"));
        }
        if config.jobs == Some(0) {
            return Err(invalid("jobs must be at least 1"));
        }
        if config.build.timeout_secs == 0 {
            return Err(invalid("build.timeout_secs must be at least 1"));
        }
        Ok(config)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ConfigRead`] if the file cannot be read, or
    /// any error from [`InstallerConfig::parse`].
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            InstallerError::ConfigRead {
                path: path.to_owned(),
                source,
            }
        })?;
        Self::parse(&contents, path)
    }

    /// Find and load the configuration for `project_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any discovered file
    /// is unreadable or invalid.
    pub fn discover(
        explicit: Option<&Utf8Path>,
        project_dir: &Utf8Path,
        dirs: &dyn BaseDirs,
    ) -> Result<LoadedConfig> {
        if let Some(path) = explicit {
            return Ok(LoadedConfig {
                config: Self::load(path)?,
                source: Some(path.to_owned()),
            });
        }

        let user_config = dirs
            .config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join(USER_CONFIG_FILENAME));
        let candidates = std::iter::once(project_dir.join(CONFIG_FILENAME)).chain(user_config);

        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("using configuration {candidate}");
                return Ok(LoadedConfig {
                    config: Self::load(&candidate)?,
                    source: Some(candidate),
                });
            }
        }

        log::debug!("no configuration file found; using defaults");
        Ok(LoadedConfig::default())
    }

    /// The module table: the configured modules, or the built-in suite.
    ///
    /// # Errors
    ///
    /// Returns any validation error from [`Catalog::new`].
    pub fn catalog(&self) -> Result<Catalog> {
        if self.modules.is_empty() {
            return Ok(Catalog::jamoma());
        }
        Catalog::new(self.modules.iter().cloned().map(Module::from).collect())
    }

    /// Pick the active module name.
    ///
    /// Precedence is `cli`, then `env`, then the configured `project`, then
    /// the final component of `project_dir`. Blank values are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ProjectNotFound`] if every source is blank.
    pub fn resolve_project(
        &self,
        cli: Option<&str>,
        env: Option<&str>,
        project_dir: &Utf8Path,
    ) -> Result<ModuleName> {
        [cli, env, self.project.as_deref(), project_dir.file_name()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(ModuleName::from)
            .ok_or_else(|| InstallerError::ProjectNotFound {
                reason: format!("cannot name the project in {project_dir}; pass --project"),
            })
    }

    /// Stage layout for `project`, with configured paths resolved against
    /// `project_dir`.
    #[must_use]
    pub fn layout(&self, project: ModuleName, project_dir: &Utf8Path) -> StageLayout {
        let resolve = |path: Option<&Utf8PathBuf>, default: &Utf8Path| {
            path.map_or_else(|| default.to_owned(), |configured| project_dir.join(configured))
        };
        let conventional = StageLayout::conventional(project, project_dir);
        StageLayout {
            workspace_dir: resolve(self.workspace_dir.as_ref(), &conventional.workspace_dir),
            staging_root: resolve(self.staging_dir.as_ref(), &conventional.staging_root),
            system_root: resolve(self.system_root.as_ref(), &conventional.system_root),
            alias_dir: resolve(self.alias_dir.as_ref(), &conventional.alias_dir),
            ..conventional
        }
    }

    /// The pinned platform, or whatever `host` resolves.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error when no platform is pinned.
    pub fn platform_or(&self, host: impl FnOnce() -> Result<PlatformKind>) -> Result<PlatformKind> {
        self.platform.map_or_else(host, Ok)
    }

    /// Copy worker count: `cli`, then the configured value, then the
    /// available parallelism.
    #[must_use]
    pub fn jobs(&self, cli: Option<usize>) -> usize {
        cli.or(self.jobs)
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
    }
}

/// Resolve the project directory to an existing absolute path.
///
/// # Errors
///
/// Returns [`InstallerError::ProjectNotFound`] if the path is not a
/// directory.
pub fn resolve_project_dir(cli: Option<&Utf8Path>, cwd: &Utf8Path) -> Result<Utf8PathBuf> {
    let dir = cli.map_or_else(|| cwd.to_owned(), |path| cwd.join(path));
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(InstallerError::ProjectNotFound {
            reason: format!("{dir} is not a directory"),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
