//! The shared installation root and its lifecycle.
//!
//! The root is partitioned into one subtree per [`ArtifactKind`]. A fresh
//! install wipes every subtree and repopulates it; the wipe is not atomic and
//! an interrupted run may leave the root partially empty until the next
//! successful install.

use crate::descriptor::ArtifactKind;
use crate::error::{InstallerError, Result};
use crate::fsops;
use crate::platform::{PlatformKind, PlatformStep};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io;

/// File name suffix of editor and patch backups swept from the root.
pub const BACKUP_SUFFIX: &str = ".orig";

/// A directory tree holding installed artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRoot {
    path: Utf8PathBuf,
}

impl InstallationRoot {
    /// Wrap the root directory at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Directory holding artifacts of `kind`.
    #[must_use]
    pub fn subtree(&self, kind: ArtifactKind) -> Utf8PathBuf {
        self.path.join(kind.subtree())
    }

    /// Create the root and every missing subtree.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] if a directory cannot be created.
    pub fn create_subtrees(&self) -> Result<()> {
        for kind in ArtifactKind::ALL {
            fsops::ensure_dir(&self.subtree(kind))
                .map_err(|e| e.into_error("creating"))?;
        }
        Ok(())
    }

    /// Remove everything inside each subtree, leaving the subtrees empty.
    ///
    /// Symlinks are removed rather than followed. Missing subtrees are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] on the first entry that cannot be
    /// removed.
    pub fn clear_subtrees(&self) -> Result<usize> {
        let mut removed = 0;
        for kind in ArtifactKind::ALL {
            let subtree = self.subtree(kind);
            let entries = fsops::list_dir(&subtree).map_err(|e| e.into_error("cleaning"))?;
            for entry in entries {
                fsops::remove_entry(&entry).map_err(|e| e.into_error("cleaning"))?;
                removed += 1;
            }
        }
        log::debug!("removed {removed} entries from {}", self.path);
        Ok(removed)
    }

    /// Remove stray `*.orig` backup files from every subtree.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] if a backup cannot be removed.
    pub fn purge_backups(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut purged = Vec::new();
        for kind in ArtifactKind::ALL {
            let pattern = format!(
                "{}/**/*{BACKUP_SUFFIX}",
                glob::Pattern::escape(self.subtree(kind).as_str())
            );
            let entries = glob::glob(&pattern).map_err(|err| InstallerError::StagingFailed {
                reason: format!("bad backup pattern {pattern}: {err}"),
            })?;
            for path in entries
                .filter_map(std::result::Result::ok)
                .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
            {
                let is_file = fs::symlink_metadata(&path).is_ok_and(|meta| !meta.is_dir());
                if is_file {
                    fsops::remove_entry(&path).map_err(|e| e.into_error("removing backups from"))?;
                    purged.push(path);
                }
            }
        }
        purged.sort();
        Ok(purged)
    }
}

/// Gatekeeper for mutations of the installation root.
///
/// Write access is probed once per run and the answer is remembered. A
/// denial is never downgraded to a warning.
#[derive(Debug)]
pub struct RootManager {
    platform: PlatformKind,
    privilege: Cell<Option<bool>>,
    probes: Cell<u32>,
}

impl RootManager {
    /// Create a manager for `platform`.
    #[must_use]
    pub const fn new(platform: PlatformKind) -> Self {
        Self {
            platform,
            privilege: Cell::new(None),
            probes: Cell::new(0),
        }
    }

    /// Number of times write access was actually probed.
    #[must_use]
    pub fn probe_count(&self) -> u32 {
        self.probes.get()
    }

    /// Make sure the process may write to `root`.
    ///
    /// The nearest existing ancestor of the root is probed by creating and
    /// removing a scratch file. Later calls reuse the first answer.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PermissionDenied`] with a hint to re-run with
    /// elevated privileges.
    pub fn request_privilege(&self, root: &InstallationRoot) -> Result<()> {
        let granted = if let Some(known) = self.privilege.get() {
            known
        } else {
            self.probes.set(self.probes.get().saturating_add(1));
            let answer = probe_write_access(root.path())?;
            self.privilege.set(Some(answer));
            answer
        };

        if granted {
            Ok(())
        } else {
            Err(InstallerError::PermissionDenied {
                path: root.path().to_owned(),
                operation: "writing to",
            })
        }
    }

    /// Create the root and its subtrees.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unsupported`] before touching anything on
    /// platforms without an installation root, and
    /// [`InstallerError::PermissionDenied`] without write access.
    pub fn ensure(&self, root: &InstallationRoot) -> Result<()> {
        self.platform.check(&[PlatformStep::PrepareRoot])?;
        self.request_privilege(root)?;
        root.create_subtrees()
    }

    /// Empty every subtree of the root.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unsupported`] before touching anything on
    /// platforms without an installation root, and
    /// [`InstallerError::PermissionDenied`] without write access.
    pub fn clean(&self, root: &InstallationRoot) -> Result<usize> {
        self.platform.check(&[PlatformStep::CleanRoot])?;
        self.request_privilege(root)?;
        root.clear_subtrees()
    }
}

/// Whether a scratch file can be created next to or inside `root`.
fn probe_write_access(root: &Utf8Path) -> Result<bool> {
    let Some(existing) = root.ancestors().find(|ancestor| ancestor.is_dir()) else {
        return Ok(false);
    };
    let probe = existing.join(format!(".jamoma-installer-probe-{}", std::process::id()));

    match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(file) => {
            drop(file);
            fsops::remove_entry(&probe).map_err(|e| e.into_error("probing"))?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            log::debug!("write probe in {existing} denied: {err}");
            Ok(false)
        }
        Err(err) => Err(fsops::FsFailure::classify(err, &probe).into_error("probing")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Scratch {
        _temp: TempDir,
        root: InstallationRoot,
    }

    #[fixture]
    fn scratch() -> Scratch {
        let temp = TempDir::new().expect("temp dir");
        let base = Utf8PathBuf::from_path_buf(temp.path().to_owned()).expect("utf8 temp dir");
        Scratch {
            root: InstallationRoot::new(base.join("jamoma")),
            _temp: temp,
        }
    }

    fn populate(root: &InstallationRoot) {
        root.create_subtrees().expect("create subtrees");
        fs::write(root.subtree(ArtifactKind::Library).join("JamomaDSP.dylib"), "lib")
            .expect("write library");
        let nested = root.subtree(ArtifactKind::Header).join("nested");
        fs::create_dir_all(&nested).expect("create nested");
        fs::write(nested.join("TTDSP.h"), "h").expect("write header");
        fs::write(
            root.subtree(ArtifactKind::PluginBundle).join("OSC.ttdylib.orig"),
            "backup",
        )
        .expect("write backup");
    }

    #[rstest]
    fn ensure_creates_all_subtrees_idempotently(scratch: Scratch) {
        let manager = RootManager::new(PlatformKind::MacLike);
        manager.ensure(&scratch.root).expect("first ensure");
        manager.ensure(&scratch.root).expect("second ensure");

        for kind in ArtifactKind::ALL {
            assert!(scratch.root.subtree(kind).is_dir(), "{kind} subtree missing");
        }
    }

    #[rstest]
    fn clean_empties_subtrees_but_keeps_them(scratch: Scratch) {
        populate(&scratch.root);
        let manager = RootManager::new(PlatformKind::MacLike);

        let removed = manager.clean(&scratch.root).expect("clean");

        assert_eq!(removed, 3);
        for kind in ArtifactKind::ALL {
            let subtree = scratch.root.subtree(kind);
            assert!(subtree.is_dir());
            assert!(fsops::list_dir(&subtree).expect("list").is_empty());
        }
    }

    #[rstest]
    fn clean_of_missing_root_is_a_no_op(scratch: Scratch) {
        let manager = RootManager::new(PlatformKind::MacLike);
        assert_eq!(manager.clean(&scratch.root).expect("clean"), 0);
    }

    #[cfg(unix)]
    #[rstest]
    fn clean_removes_symlinks_without_following(scratch: Scratch) {
        scratch.root.create_subtrees().expect("create subtrees");
        let outside = scratch.root.path().with_file_name("outside.dylib");
        fs::write(&outside, "keep me").expect("write outside file");
        std::os::unix::fs::symlink(
            &outside,
            scratch.root.subtree(ArtifactKind::Library).join("link.dylib"),
        )
        .expect("create symlink");

        RootManager::new(PlatformKind::MacLike)
            .clean(&scratch.root)
            .expect("clean");

        assert!(outside.is_file());
    }

    #[rstest]
    fn purge_backups_removes_only_orig_files(scratch: Scratch) {
        populate(&scratch.root);

        let purged = scratch.root.purge_backups().expect("purge");

        assert_eq!(purged.len(), 1);
        assert!(
            scratch
                .root
                .subtree(ArtifactKind::Library)
                .join("JamomaDSP.dylib")
                .is_file()
        );
        assert!(
            !scratch
                .root
                .subtree(ArtifactKind::PluginBundle)
                .join("OSC.ttdylib.orig")
                .exists()
        );
    }

    #[rstest]
    #[case::windows(PlatformKind::Windows)]
    #[case::other(PlatformKind::Other)]
    fn unsupported_platforms_touch_nothing(scratch: Scratch, #[case] platform: PlatformKind) {
        let manager = RootManager::new(platform);

        assert!(matches!(
            manager.ensure(&scratch.root),
            Err(InstallerError::Unsupported { .. })
        ));
        assert!(matches!(
            manager.clean(&scratch.root),
            Err(InstallerError::Unsupported { .. })
        ));
        assert!(!scratch.root.path().exists());
        assert_eq!(manager.probe_count(), 0);
    }

    #[rstest]
    fn privilege_is_probed_once_per_run(scratch: Scratch) {
        let manager = RootManager::new(PlatformKind::MacLike);
        manager.ensure(&scratch.root).expect("ensure");
        manager.clean(&scratch.root).expect("clean");
        manager.ensure(&scratch.root).expect("ensure again");

        assert_eq!(manager.probe_count(), 1);
    }

    #[cfg(unix)]
    #[rstest]
    fn read_only_parent_is_permission_denied(scratch: Scratch) {
        use std::os::unix::fs::PermissionsExt;

        // SAFETY: `geteuid` has no preconditions.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let parent = scratch.root.path().parent().expect("root has parent").to_owned();
        let locked = parent.join("locked");
        fs::create_dir(&locked).expect("create locked dir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");
        let root = InstallationRoot::new(locked.join("jamoma"));
        let manager = RootManager::new(PlatformKind::MacLike);

        let first = manager.ensure(&root);
        let second = manager.clean(&root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("restore");

        assert!(matches!(first, Err(InstallerError::PermissionDenied { .. })));
        assert!(matches!(second, Err(InstallerError::PermissionDenied { .. })));
        assert_eq!(manager.probe_count(), 1);
    }
}
