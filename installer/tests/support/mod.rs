//! Test support utilities for installer behavioural tests.
//!
//! Every scenario works on a throwaway suite checkout: sibling module
//! directories under a temporary directory plus private stand-ins for the
//! system root and the alias location, so nothing outside the temporary
//! directory is ever touched.

use camino::{Utf8Path, Utf8PathBuf};
use jamoma_installer::catalog::{Catalog, Module, ModuleName};
use jamoma_installer::descriptor::ArtifactDescriptor;
use jamoma_installer::lock::LOCK_FILENAME;
use jamoma_installer::stage::StageLayout;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

/// A temporary suite checkout.
pub struct Checkout {
    _temp: TempDir,
    /// Directory holding every module checkout and the private roots.
    pub base: Utf8PathBuf,
}

impl Checkout {
    /// Create an empty checkout.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let base = Utf8PathBuf::from_path_buf(temp.path().to_owned()).expect("utf8 temp dir");
        Self { _temp: temp, base }
    }

    /// Project directory of `module`.
    pub fn module_dir(&self, module: &str) -> Utf8PathBuf {
        self.base.join("src").join(module)
    }

    /// Private stand-in for the system root.
    pub fn system_root(&self) -> Utf8PathBuf {
        self.base.join("usr").join("jamoma")
    }

    /// Private stand-in for the alias location.
    pub fn alias_dir(&self) -> Utf8PathBuf {
        self.base.join("usr").join("lib")
    }

    /// Layout for `project`, pointing the system locations at the private
    /// stand-ins.
    pub fn layout(&self, project: &str) -> StageLayout {
        let project_dir = self.module_dir(project);
        fs::create_dir_all(&project_dir).expect("create project dir");
        StageLayout {
            system_root: self.system_root(),
            alias_dir: self.alias_dir(),
            ..StageLayout::conventional(ModuleName::from(project), &project_dir)
        }
    }

    /// Write a build output file for `module`.
    pub fn build_file(&self, module: &str, relative: &str) {
        let path = self.module_dir(module).join(relative);
        fs::create_dir_all(path.parent().expect("file has parent")).expect("create dirs");
        fs::write(&path, format!("{module}:{relative}")).expect("write artifact");
    }

    /// Write the library a [`two_module_catalog`] module produces.
    pub fn build_library(&self, module: &str) {
        self.build_file(module, &format!("library/build/Jamoma{module}.dylib"));
        self.build_file(module, &format!("library/includes/TT{module}.h"));
    }

    /// Canonical alias path for `name`.
    pub fn alias(&self, name: &str) -> Utf8PathBuf {
        self.alias_dir().join(name)
    }
}

/// Foundation and DSP, each with one header glob and one aliased library.
pub fn two_module_catalog() -> Catalog {
    let module = |name: &str, priority: u32| {
        Module::new(name, priority)
            .artifact(ArtifactDescriptor::header("library/includes/*.h"))
            .artifact(ArtifactDescriptor::library(format!("library/build/Jamoma{name}{{lib}}")).aliased())
    };
    Catalog::new(vec![
        module("Foundation", 0),
        module("DSP", 1).depends_on("Foundation"),
    ])
    .expect("valid catalog")
}

/// Every file below `root`, relative, with its contents. Symlinks are
/// recorded by their target. The lock file is skipped because it records
/// the time of each run.
pub fn snapshot(root: &Utf8Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }
    let mut pending = vec![root.to_owned()];
    while let Some(dir) = pending.pop() {
        for entry in dir.read_dir_utf8().expect("read dir") {
            let path = entry.expect("dir entry").into_path();
            let relative = path.strip_prefix(root).expect("below root").to_string();
            if let Ok(target) = path.read_link_utf8() {
                files.insert(relative, format!("-> {target}"));
            } else if path.is_dir() {
                pending.push(path);
            } else if path.file_name() != Some(LOCK_FILENAME) {
                files.insert(relative, fs::read_to_string(&path).expect("read file"));
            }
        }
    }
    files
}
