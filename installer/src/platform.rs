//! Platform resolution and the per-platform capability matrix.
//!
//! The resolver is a pure function of the host operating system. Every
//! platform-conditional step asks [`PlatformKind::supports`] first and turns a
//! refusal into [`InstallerError::Unsupported`] rather than silently
//! succeeding.

use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family the installer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    /// Microsoft Windows.
    Windows,
    /// macOS and other Darwin-derived systems.
    MacLike,
    /// Any other identifiable operating system.
    Other,
}

/// A step of the pipeline whose availability depends on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformStep {
    /// Running the external build command.
    Build,
    /// Copying build output into the local staging tree.
    StageLocal,
    /// Creating the system installation root.
    PrepareRoot,
    /// Wiping the system installation root.
    CleanRoot,
    /// Copying staged artifacts into the system installation root.
    PromoteSystem,
    /// Creating aliases in the shared library location.
    LinkAliases,
}

impl PlatformStep {
    /// Steps performed by the `install` action, in execution order.
    pub const INSTALL: [Self; 4] = [
        Self::PrepareRoot,
        Self::CleanRoot,
        Self::PromoteSystem,
        Self::LinkAliases,
    ];

    /// Steps performed by the `build` action, in execution order.
    pub const BUILD: [Self; 2] = [Self::Build, Self::StageLocal];

    /// Human-readable step description.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "run external build",
            Self::StageLocal => "stage build output locally",
            Self::PrepareRoot => "prepare installation root",
            Self::CleanRoot => "clean installation root",
            Self::PromoteSystem => "promote to installation root",
            Self::LinkAliases => "link aliases",
        }
    }
}

impl fmt::Display for PlatformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlatformKind {
    /// Map an operating system identifier (as in `std::env::consts::OS`) to a
    /// platform family.
    ///
    /// Returns `None` when the identifier is blank.
    #[must_use]
    pub fn from_os(os: &str) -> Option<Self> {
        match os.trim() {
            "" => None,
            "macos" | "ios" => Some(Self::MacLike),
            "windows" => Some(Self::Windows),
            _ => Some(Self::Other),
        }
    }

    /// Lowercase identifier, matching the configuration file spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacLike => "mac-like",
            Self::Other => "other",
        }
    }

    /// Whether this platform can perform `step`.
    ///
    /// Building and local staging are portable. Everything touching the
    /// shared system locations exists only for Mac-like hosts.
    #[must_use]
    pub const fn supports(self, step: PlatformStep) -> bool {
        match step {
            PlatformStep::Build | PlatformStep::StageLocal => true,
            PlatformStep::PrepareRoot
            | PlatformStep::CleanRoot
            | PlatformStep::PromoteSystem
            | PlatformStep::LinkAliases => matches!(self, Self::MacLike),
        }
    }

    /// Verify every step in `steps` is supported.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unsupported`] listing each unsupported step.
    pub fn check(self, steps: &[PlatformStep]) -> Result<()> {
        let unsupported: Vec<PlatformStep> = steps
            .iter()
            .copied()
            .filter(|step| !self.supports(*step))
            .collect();

        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::Unsupported {
                platform: self,
                steps: unsupported,
            })
        }
    }

    /// Shared library file extension, including the dot.
    #[must_use]
    pub const fn library_extension(self) -> &'static str {
        match self {
            Self::Windows => ".dll",
            Self::MacLike => ".dylib",
            Self::Other => ".so",
        }
    }

    /// Plugin bundle file extension, including the dot.
    #[must_use]
    pub const fn plugin_extension(self) -> &'static str {
        match self {
            Self::Windows => ".ttdll",
            Self::MacLike => ".ttdylib",
            Self::Other => ".ttso",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the platform of the running host.
///
/// # Errors
///
/// Returns [`InstallerError::PlatformUnknown`] if the host cannot be identified.
pub fn resolve() -> Result<PlatformKind> {
    resolve_from(std::env::consts::OS)
}

/// Resolve a platform from an explicit operating system identifier.
///
/// # Errors
///
/// Returns [`InstallerError::PlatformUnknown`] for a blank identifier.
pub fn resolve_from(os: &str) -> Result<PlatformKind> {
    PlatformKind::from_os(os).ok_or(InstallerError::PlatformUnknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::macos("macos", PlatformKind::MacLike)]
    #[case::ios("ios", PlatformKind::MacLike)]
    #[case::windows("windows", PlatformKind::Windows)]
    #[case::linux("linux", PlatformKind::Other)]
    #[case::freebsd("freebsd", PlatformKind::Other)]
    fn resolve_from_maps_os_identifiers(#[case] os: &str, #[case] expected: PlatformKind) {
        assert_eq!(resolve_from(os).ok(), Some(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    fn resolve_from_blank_is_unknown(#[case] os: &str) {
        assert!(matches!(
            resolve_from(os),
            Err(InstallerError::PlatformUnknown)
        ));
    }

    #[test]
    fn host_platform_resolves() {
        assert!(resolve().is_ok());
    }

    #[test]
    fn mac_like_supports_every_step() {
        let all = [PlatformStep::BUILD.as_slice(), PlatformStep::INSTALL.as_slice()].concat();
        assert!(PlatformKind::MacLike.check(&all).is_ok());
    }

    #[rstest]
    #[case::windows(PlatformKind::Windows)]
    #[case::other(PlatformKind::Other)]
    fn non_mac_platforms_report_each_install_step(#[case] platform: PlatformKind) {
        let err = platform
            .check(&PlatformStep::INSTALL)
            .expect_err("install steps should be unsupported");
        match err {
            InstallerError::Unsupported { steps, .. } => {
                assert_eq!(steps, PlatformStep::INSTALL.to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    #[case::windows(PlatformKind::Windows)]
    #[case::other(PlatformKind::Other)]
    #[case::mac(PlatformKind::MacLike)]
    fn build_steps_are_portable(#[case] platform: PlatformKind) {
        assert!(platform.check(&PlatformStep::BUILD).is_ok());
    }

    #[test]
    fn platform_kind_parses_from_config_spelling() {
        let parsed: PlatformKind =
            serde_json::from_str("\"mac-like\"").expect("mac-like should parse");
        assert_eq!(parsed, PlatformKind::MacLike);
    }
}
