//! Version-independent aliases in the shared library location.
//!
//! Each alias is a symbolic link created at a temporary sibling path and
//! renamed over the canonical name, so readers see either the previous alias
//! or the new one and never a missing file.

use crate::catalog::{Module, ModuleName};
use crate::error::{InstallerError, Result};
use crate::fsops::{self, FsFailure};
use crate::platform::{PlatformKind, PlatformStep};
use crate::stage::StageLayout;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;
use std::io;

/// A request to alias one installed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRequest {
    /// Module owning the artifact.
    pub module: ModuleName,
    /// Canonical alias path in the alias location.
    pub canonical: Utf8PathBuf,
    /// Installed artifact the alias points at.
    pub target: Utf8PathBuf,
    /// Whether a failure aborts the run.
    pub required: bool,
}

/// Outcome of one alias request.
#[derive(Debug)]
pub struct AliasOutcome {
    /// The request.
    pub request: AliasRequest,
    /// Whether the alias was created.
    pub result: Result<()>,
}

impl AliasOutcome {
    /// Whether the alias now exists.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.result.is_ok()
    }
}

/// Alias requests for every aliased descriptor of `modules`, in module order.
///
/// An alias name claimed by an earlier module is not requested again.
#[must_use]
pub fn alias_requests(
    modules: &[&Module],
    layout: &StageLayout,
    platform: PlatformKind,
) -> Vec<AliasRequest> {
    let mut seen = BTreeSet::new();
    let mut requests = Vec::new();

    for module in modules {
        for descriptor in &module.artifacts {
            let (Some(alias), Some(file_name)) =
                (descriptor.alias_name(platform), descriptor.file_name(platform))
            else {
                continue;
            };
            let canonical = layout.alias_dir.join(alias);
            if !seen.insert(canonical.clone()) {
                log::debug!("{canonical} already claimed; skipping {}", module.name);
                continue;
            }
            requests.push(AliasRequest {
                module: module.name.clone(),
                canonical,
                target: StageLayout::subtree(&layout.system_root, descriptor.kind).join(file_name),
                required: !descriptor.optional,
            });
        }
    }

    requests
}

/// Creates, replaces and prunes aliases.
#[derive(Debug, Clone, Copy)]
pub struct AliasLinker {
    platform: PlatformKind,
}

impl AliasLinker {
    /// Create a linker for `platform`.
    #[must_use]
    pub const fn new(platform: PlatformKind) -> Self {
        Self { platform }
    }

    /// Point `canonical` at `target`, replacing any previous alias.
    ///
    /// When `target` is missing, a previous alias that no longer resolves is
    /// removed so no dangling link is left behind.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unsupported`] on platforms without aliases,
    /// [`InstallerError::AliasTargetMissing`] if `target` does not exist,
    /// [`InstallerError::PermissionDenied`] without write access to the alias
    /// location, and [`InstallerError::AliasFailed`] otherwise.
    pub fn link(&self, canonical: &Utf8Path, target: &Utf8Path) -> Result<()> {
        self.platform.check(&[PlatformStep::LinkAliases])?;

        if !target.exists() {
            drop_dangling(canonical);
            return Err(InstallerError::AliasTargetMissing {
                alias: canonical.to_owned(),
                target: target.to_owned(),
            });
        }

        let (Some(parent), Some(name)) = (canonical.parent(), canonical.file_name()) else {
            return Err(InstallerError::AliasFailed {
                alias: canonical.to_owned(),
                reason: "alias path has no file name".to_owned(),
            });
        };
        fsops::ensure_dir(parent).map_err(|e| alias_error(canonical, e))?;

        let staging = parent.join(format!(".{name}.{}.tmp", std::process::id()));
        fsops::remove_entry(&staging).map_err(|e| alias_error(canonical, e))?;

        if let Err(err) = create_symlink(target, &staging) {
            return Err(alias_error(canonical, FsFailure::classify(err, &staging)));
        }
        if let Err(err) = fs::rename(&staging, canonical) {
            if let Err(cleanup) = fsops::remove_entry(&staging) {
                log::debug!("could not remove {staging}: {cleanup}");
            }
            return Err(alias_error(canonical, FsFailure::classify(err, canonical)));
        }

        log::debug!("linked {canonical} -> {target}");
        Ok(())
    }

    /// Process every request independently.
    ///
    /// One failing alias never prevents the others from being attempted.
    #[must_use]
    pub fn link_all(&self, requests: Vec<AliasRequest>) -> Vec<AliasOutcome> {
        requests
            .into_iter()
            .map(|request| {
                let result = self.link(&request.canonical, &request.target);
                if let Err(err) = &result {
                    if request.required {
                        log::error!("{err}");
                    } else {
                        log::warn!("{err}");
                    }
                }
                AliasOutcome { request, result }
            })
            .collect()
    }

    /// Remove aliases in `alias_dir` that point into `root` but are not in
    /// `keep`.
    ///
    /// Other files in the alias location are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unsupported`] on platforms without aliases,
    /// and [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] if a stale alias cannot be removed.
    pub fn prune_stale(
        &self,
        alias_dir: &Utf8Path,
        root: &Utf8Path,
        keep: &BTreeSet<Utf8PathBuf>,
    ) -> Result<Vec<Utf8PathBuf>> {
        self.platform.check(&[PlatformStep::LinkAliases])?;

        let mut pruned = Vec::new();
        let entries = fsops::list_dir(alias_dir).map_err(|e| e.into_error("pruning aliases in"))?;
        for entry in entries {
            if keep.contains(&entry) {
                continue;
            }
            let Ok(destination) = entry.read_link_utf8() else {
                continue;
            };
            if destination.starts_with(root) {
                fsops::remove_entry(&entry).map_err(|e| e.into_error("pruning aliases in"))?;
                log::debug!("pruned stale alias {entry}");
                pruned.push(entry);
            }
        }
        Ok(pruned)
    }
}

/// Remove `alias` if it is a symlink whose destination is gone.
fn drop_dangling(alias: &Utf8Path) {
    let is_link = alias
        .symlink_metadata()
        .is_ok_and(|metadata| metadata.file_type().is_symlink());
    if !is_link || alias.exists() {
        return;
    }
    match fsops::remove_entry(alias) {
        Ok(()) => log::debug!("removed dangling alias {alias}"),
        Err(err) => log::warn!("could not remove dangling alias {alias}: {err}"),
    }
}

fn alias_error(alias: &Utf8Path, failure: FsFailure) -> InstallerError {
    match failure {
        FsFailure::PermissionDenied { path } => InstallerError::PermissionDenied {
            path,
            operation: "linking",
        },
        other => InstallerError::AliasFailed {
            alias: alias.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(unix)]
fn create_symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Utf8Path, _link: &Utf8Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not available on this platform",
    ))
}
