//! Error types for the Jamoma installer.
//!
//! Every variant here is fatal: it aborts the run with a non-zero exit code.
//! Recoverable conditions such as missing optional artifacts are not errors;
//! they are collected as [`crate::report::Warning`] values instead. Messages
//! carry a recovery hint where one exists.

use crate::catalog::ModuleName;
use crate::platform::{PlatformKind, PlatformStep};
use crate::stage::Stage;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while building, staging, or installing modules.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The host operating system could not be identified.
    #[error(
        "could not determine the host platform; pin one with `platform = \"mac-like\"` in the configuration file"
    )]
    PlatformUnknown,

    /// One or more platform-conditional steps are not available on this platform.
    #[error("unsupported on {platform}: {}", join_steps(.steps))]
    Unsupported {
        /// The resolved platform.
        platform: PlatformKind,
        /// Every step the platform cannot perform.
        steps: Vec<PlatformStep>,
    },

    /// The module dependency relation contains a cycle.
    #[error("cyclic module dependency between: {}", join_modules(.modules))]
    CyclicDependency {
        /// Modules that could not be ordered.
        modules: Vec<ModuleName>,
    },

    /// A module name does not appear in the module table.
    #[error("module {name} is not declared in the module table")]
    UnknownModule {
        /// The unknown module name.
        name: ModuleName,
    },

    /// A module depends on a module that is not declared.
    #[error("module {module} depends on undeclared module {dependency}")]
    UnknownDependency {
        /// The declaring module.
        module: ModuleName,
        /// The missing dependency.
        dependency: ModuleName,
    },

    /// The same module name is declared twice.
    #[error("module {name} is declared more than once")]
    DuplicateModule {
        /// The duplicated module name.
        name: ModuleName,
    },

    /// A promotion was requested between stages that are not adjacent.
    #[error("cannot promote artifacts from {from} to {to}; promotion only moves to the next stage")]
    InvalidPromotion {
        /// Source stage.
        from: Stage,
        /// Requested destination stage.
        to: Stage,
    },

    /// The process lacks permission to modify a path.
    #[error("permission denied while {operation} {path}; re-run with elevated privileges (e.g. sudo)")]
    PermissionDenied {
        /// The path that could not be modified.
        path: Utf8PathBuf,
        /// What the installer was doing.
        operation: &'static str,
    },

    /// Copying artifacts between stages failed.
    #[error("staging failed: {reason}")]
    StagingFailed {
        /// Description of the failure.
        reason: String,
    },

    /// An alias would point at an artifact that does not exist.
    #[error("cannot link {alias}: target {target} does not exist")]
    AliasTargetMissing {
        /// Canonical alias location.
        alias: Utf8PathBuf,
        /// The missing artifact.
        target: Utf8PathBuf,
    },

    /// An alias could not be created for a reason other than a missing target.
    #[error("cannot link {alias}: {reason}")]
    AliasFailed {
        /// Canonical alias location.
        alias: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The external build command failed.
    #[error("build failed for {module}: {reason}")]
    BuildFailed {
        /// The module being built.
        module: ModuleName,
        /// Description of the failure, usually the command's stderr.
        reason: String,
    },

    /// The external build command did not finish in time.
    #[error("build for {module} timed out after {timeout_secs} seconds")]
    BuildTimedOut {
        /// The module being built.
        module: ModuleName,
        /// The configured timeout.
        timeout_secs: u64,
    },

    /// A configuration file could not be read.
    #[error("failed to read configuration {path}")]
    ConfigRead {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is malformed.
    #[error("invalid configuration {path}: {reason}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// The project directory could not be resolved.
    #[error("project directory not usable: {reason}")]
    ProjectNotFound {
        /// Description of the problem.
        reason: String,
    },

    /// Another installer run holds the installation lock.
    #[error(
        "installation root is locked by {holder}; if no installer is running, remove {path}"
    )]
    LockContention {
        /// Path to the lock file.
        path: Utf8PathBuf,
        /// Description of the holding process.
        holder: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing output failed.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

fn join_steps(steps: &[PlatformStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_modules(modules: &[ModuleName]) -> String {
    modules
        .iter()
        .map(ModuleName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_lists_every_step() {
        let err = InstallerError::Unsupported {
            platform: PlatformKind::Other,
            steps: vec![PlatformStep::CleanRoot, PlatformStep::LinkAliases],
        };
        let msg = err.to_string();
        assert!(msg.contains("other"));
        assert!(msg.contains("clean installation root"));
        assert!(msg.contains("link aliases"));
    }

    #[test]
    fn cyclic_dependency_names_modules() {
        let err = InstallerError::CyclicDependency {
            modules: vec![ModuleName::from("DSP"), ModuleName::from("Modular")],
        };
        assert_eq!(err.to_string(), "cyclic module dependency between: DSP, Modular");
    }

    #[test]
    fn permission_denied_suggests_elevation() {
        let err = InstallerError::PermissionDenied {
            path: Utf8PathBuf::from("/usr/local/jamoma"),
            operation: "cleaning",
        };
        let msg = err.to_string();
        assert!(msg.contains("/usr/local/jamoma"));
        assert!(msg.contains("sudo"));
    }

    #[test]
    fn alias_target_missing_includes_both_paths() {
        let err = InstallerError::AliasTargetMissing {
            alias: Utf8PathBuf::from("/usr/local/lib/JamomaDSP.dylib"),
            target: Utf8PathBuf::from("/usr/local/jamoma/lib/JamomaDSP.dylib"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/usr/local/lib/JamomaDSP.dylib"));
        assert!(msg.contains("/usr/local/jamoma/lib/JamomaDSP.dylib"));
    }

    #[test]
    fn config_read_preserves_source() {
        let err = InstallerError::ConfigRead {
            path: Utf8PathBuf::from("jamoma-installer.toml"),
            source: std::io::Error::other("disk on fire"),
        };
        assert!(err.to_string().contains("jamoma-installer.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
