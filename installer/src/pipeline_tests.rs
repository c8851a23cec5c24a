//! Unit tests for pipeline orchestration.
//!
//! The suite is a two-module table (Foundation and DSP) checked out under a
//! temporary directory. The platform is pinned to Mac-like so the system
//! steps run on any Unix host, against private stand-ins for the system root
//! and the alias location.

use super::*;
use crate::builder::BuildInvocation;
use crate::config::BuildSettings;
use crate::descriptor::ArtifactDescriptor;
use crate::test_utils::{ExpectedCall, StubExecutor};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

struct Suite {
    _temp: TempDir,
    layout: StageLayout,
    catalog: Catalog,
}

impl Suite {
    fn context(&self, platform: PlatformKind) -> PipelineContext<'_> {
        PipelineContext {
            platform,
            layout: &self.layout,
            catalog: &self.catalog,
            jobs: 2,
            quiet: true,
        }
    }

    fn write(&self, module: &str, relative: &str) {
        let path = self
            .layout
            .build_output_dir(&ModuleName::from(module))
            .join(relative);
        fs::create_dir_all(path.parent().expect("file has parent")).expect("create dirs");
        fs::write(&path, relative).expect("write artifact");
    }

    fn build_everything(&self) {
        self.write("Foundation", "library/includes/TTFoundation.h");
        self.write("Foundation", "library/build/JamomaFoundation.dylib");
        self.write("DSP", "library/includes/TTDSP.h");
        self.write("DSP", "library/build/JamomaDSP.dylib");
    }

    fn alias(&self, name: &str) -> Utf8PathBuf {
        self.layout.alias_dir.join(name)
    }
}

#[fixture]
fn suite() -> Suite {
    let temp = TempDir::new().expect("temp dir");
    let base = Utf8PathBuf::from_path_buf(temp.path().to_owned()).expect("utf8 temp dir");
    let project_dir = base.join("src").join("DSP");
    fs::create_dir_all(&project_dir).expect("create project");
    let layout = StageLayout {
        system_root: base.join("usr").join("jamoma"),
        alias_dir: base.join("usr").join("lib"),
        ..StageLayout::conventional(ModuleName::from("DSP"), &project_dir)
    };
    let catalog = Catalog::new(vec![
        Module::new("DSP", 1)
            .depends_on("Foundation")
            .artifact(ArtifactDescriptor::header("library/includes/*.h"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaDSP{lib}").aliased()),
        Module::new("Foundation", 0)
            .artifact(ArtifactDescriptor::header("library/includes/*.h"))
            .artifact(ArtifactDescriptor::library("library/build/JamomaFoundation{lib}").aliased())
            .artifact(
                ArtifactDescriptor::plugin_bundle("extensions/MIDI/build/MIDI{plugin}")
                    .aliased()
                    .optional(),
            ),
    ])
    .expect("valid catalog");

    Suite {
        _temp: temp,
        layout,
        catalog,
    }
}

/// Every file below `root`, relative, with its contents.
fn snapshot(root: &Utf8Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_owned()];
    while let Some(dir) = pending.pop() {
        for entry in dir.read_dir_utf8().expect("read dir") {
            let path = entry.expect("dir entry").into_path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name() != Some(crate::lock::LOCK_FILENAME) {
                let relative = path.strip_prefix(root).expect("below root").to_string();
                files.insert(relative, fs::read_to_string(&path).unwrap_or_default());
            }
        }
    }
    files
}

fn stage_and_install(suite: &Suite) -> RunReport {
    let context = suite.context(PlatformKind::MacLike);
    let mut stderr = Vec::new();
    stage_modules(&context, &mut stderr).expect("stage");
    install_modules(&context, &mut stderr).expect("install")
}

#[rstest]
fn plan_puts_dependencies_first(suite: Suite) {
    let names = suite
        .context(PlatformKind::MacLike)
        .planned_names()
        .expect("plan");
    assert_eq!(names, vec![ModuleName::from("Foundation"), ModuleName::from("DSP")]);
}

#[rstest]
fn install_populates_root_and_aliases_in_order(suite: Suite) {
    suite.build_everything();

    let report = stage_and_install(&suite);

    let installed: Vec<&str> = report
        .installed
        .iter()
        .map(|module| module.module.as_str())
        .collect();
    assert_eq!(installed, vec!["Foundation", "DSP"]);

    let root = &suite.layout.system_root;
    assert!(root.join("lib/JamomaFoundation.dylib").is_file());
    assert!(root.join("lib/JamomaDSP.dylib").is_file());
    assert!(root.join("includes/TTDSP.h").is_file());

    for name in ["JamomaFoundation.dylib", "JamomaDSP.dylib"] {
        let target = suite.alias(name).read_link_utf8().expect("alias exists");
        assert_eq!(target, root.join("lib").join(name));
    }
    assert_eq!(report.linked_count(), 2);
}

#[rstest]
fn installing_twice_is_idempotent(suite: Suite) {
    suite.build_everything();

    stage_and_install(&suite);
    let first_root = snapshot(&suite.layout.system_root);
    let first_aliases = snapshot(&suite.layout.alias_dir);

    stage_and_install(&suite);

    assert_eq!(snapshot(&suite.layout.system_root), first_root);
    assert_eq!(snapshot(&suite.layout.alias_dir), first_aliases);
}

#[rstest]
fn install_removes_files_no_longer_staged(suite: Suite) {
    suite.build_everything();
    stage_and_install(&suite);
    let stray = suite.layout.system_root.join("lib/Obsolete.dylib");
    fs::write(&stray, "old").expect("write stray library");

    stage_and_install(&suite);

    assert!(!stray.exists());
    assert!(suite.layout.system_root.join("lib/JamomaDSP.dylib").is_file());
}

#[rstest]
#[case::windows(PlatformKind::Windows)]
#[case::other(PlatformKind::Other)]
fn install_is_unsupported_without_touching_anything(suite: Suite, #[case] platform: PlatformKind) {
    suite.build_everything();
    let mut stderr = Vec::new();

    let err = install_modules(&suite.context(platform), &mut stderr)
        .expect_err("install should be unsupported");

    match err {
        InstallerError::Unsupported { steps, .. } => {
            assert_eq!(steps, PlatformStep::INSTALL.to_vec());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!suite.layout.system_root.exists());
    assert!(!suite.layout.alias_dir.exists());
}

#[rstest]
fn staging_absent_output_only_warns(suite: Suite) {
    let mut stderr = Vec::new();

    let report = stage_modules(&suite.context(PlatformKind::Other), &mut stderr)
        .expect("absent output is not fatal");

    assert!(report.staged.iter().all(|module| module.files == 0));
    assert!(!report.warnings.is_empty());
    assert!(report.warnings.iter().all(|warning| matches!(
        warning,
        Warning::ArtifactMissing { .. } | Warning::EmptyPromotion { .. }
    )));
}

#[rstest]
fn missing_required_alias_fails_after_linking_the_rest(suite: Suite) {
    suite.write("Foundation", "library/build/JamomaFoundation.dylib");
    let context = suite.context(PlatformKind::MacLike);
    let mut stderr = Vec::new();
    stage_modules(&context, &mut stderr).expect("stage");

    let err = install_modules(&context, &mut stderr).expect_err("DSP alias has no target");

    assert!(matches!(err, InstallerError::AliasTargetMissing { .. }));
    assert!(suite.alias("JamomaFoundation.dylib").read_link_utf8().is_ok());
}

#[rstest]
fn missing_optional_alias_is_a_warning(suite: Suite) {
    suite.build_everything();

    let report = stage_and_install(&suite);

    let midi = report
        .aliases
        .iter()
        .find(|alias| alias.alias.ends_with("MIDI.ttdylib"))
        .expect("MIDI alias attempted");
    assert!(!midi.linked);
    assert!(report
        .warnings
        .iter()
        .any(|warning| matches!(warning, Warning::OptionalAliasFailed { .. })));
}

#[rstest]
fn alias_of_vanished_artifact_is_removed_on_reinstall(suite: Suite) {
    suite.build_everything();
    suite.write("Foundation", "extensions/MIDI/build/MIDI.ttdylib");
    stage_and_install(&suite);
    let midi = suite.alias("MIDI.ttdylib");
    assert!(midi.is_file(), "alias resolves after the first install");

    let built = suite
        .layout
        .build_output_dir(&ModuleName::from("Foundation"))
        .join("extensions/MIDI/build/MIDI.ttdylib");
    fs::remove_file(&built).expect("plugin no longer built");
    let report = stage_and_install(&suite);

    assert!(midi.symlink_metadata().is_err(), "no dangling alias remains");
    assert!(report
        .warnings
        .iter()
        .any(|warning| matches!(warning, Warning::OptionalAliasFailed { .. })));
    assert!(suite.alias("JamomaFoundation.dylib").is_file());
}

#[rstest]
fn stale_aliases_into_the_root_are_pruned(suite: Suite) {
    suite.build_everything();
    stage_and_install(&suite);
    let stale = suite.alias("Retired.ttdylib");
    std::os::unix::fs::symlink(
        suite.layout.system_root.join("extensions/Retired.ttdylib"),
        &stale,
    )
    .expect("create stale alias");
    let foreign = suite.alias("libz.dylib");
    fs::write(&foreign, "not ours").expect("write foreign library");

    let report = stage_and_install(&suite);

    assert_eq!(report.pruned, vec![stale.clone()]);
    assert!(stale.symlink_metadata().is_err());
    assert!(foreign.is_file());
}

#[rstest]
fn held_lock_blocks_install(suite: Suite) {
    suite.build_everything();
    let context = suite.context(PlatformKind::MacLike);
    let mut stderr = Vec::new();
    stage_modules(&context, &mut stderr).expect("stage");
    let _held = crate::lock::InstallLock::acquire(&suite.layout.system_root, "another install").expect("lock");

    let err = install_modules(&context, &mut stderr).expect_err("lock is held");

    assert!(matches!(err, InstallerError::LockContention { .. }));
}

#[rstest]
#[case::quiet(true)]
#[case::verbose(false)]
fn quiet_suppresses_progress(suite: Suite, #[case] quiet: bool) {
    let context = PipelineContext {
        quiet,
        ..suite.context(PlatformKind::MacLike)
    };
    let mut stderr = Vec::new();

    stage_modules(&context, &mut stderr).expect("stage");

    assert_eq!(stderr.is_empty(), quiet);
}

#[rstest]
fn compile_runs_build_for_active_project(suite: Suite) {
    let executor = StubExecutor::new(vec![ExpectedCall::succeeds("ruby", "DSP")]);
    let settings = BuildSettings::default();
    let builder = Builder::new(&executor, &settings);
    let mut stderr = Vec::new();

    compile(&suite.context(PlatformKind::MacLike), &builder, &mut stderr).expect("build");

    executor.assert_finished();
    let invocations: Vec<BuildInvocation> = executor.invocations();
    assert_eq!(
        invocations.first().map(|call| call.working_dir.clone()),
        Some(suite.layout.project_dir.join("support"))
    );
}
