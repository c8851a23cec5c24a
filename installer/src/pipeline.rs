//! Build, staging and installation pipeline orchestration.
//!
//! One table-driven pipeline serves every module: the active project and its
//! upstream dependencies are ordered once, then each stage is applied to each
//! module in that order. Modules are processed one at a time; only the file
//! copies inside a module run in parallel.

use crate::builder::Builder;
use crate::catalog::{Catalog, Module, ModuleName};
use crate::error::{InstallerError, Result};
use crate::graph;
use crate::linker::{AliasLinker, AliasOutcome, alias_requests};
use crate::lock::InstallLock;
use crate::output::{
    alias_line, module_line, staged_message, success_message, write_stderr_line,
};
use crate::platform::{PlatformKind, PlatformStep};
use crate::promoter::{Promoter, PromotionResult};
use crate::report::{AliasReport, RunReport, Warning};
use crate::root::{InstallationRoot, RootManager};
use crate::stage::{Stage, StageLayout};
use std::collections::BTreeSet;
use std::io::Write;

/// Context for a pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineContext<'a> {
    /// Resolved platform.
    pub platform: PlatformKind,
    /// Where every stage lives.
    pub layout: &'a StageLayout,
    /// The module table.
    pub catalog: &'a Catalog,
    /// Copy worker threads per module.
    pub jobs: usize,
    /// Suppress progress output.
    pub quiet: bool,
}

impl<'a> PipelineContext<'a> {
    /// The active project and its upstream modules, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::UnknownModule`] if the project is not in the
    /// catalog, and [`InstallerError::CyclicDependency`] for cyclic tables.
    pub fn plan(&self) -> Result<Vec<&'a Module>> {
        graph::closure(self.catalog, &self.layout.project)
    }

    /// Names of the planned modules, in processing order.
    ///
    /// # Errors
    ///
    /// Returns any error from [`PipelineContext::plan`].
    pub fn planned_names(&self) -> Result<Vec<ModuleName>> {
        Ok(self
            .plan()?
            .into_iter()
            .map(|module| module.name.clone())
            .collect())
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl std::fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, message);
        }
    }
}

/// Runs the external build command for the active project.
///
/// # Errors
///
/// Returns [`InstallerError::BuildFailed`] or
/// [`InstallerError::BuildTimedOut`] from the build step.
pub fn compile(
    context: &PipelineContext<'_>,
    builder: &Builder<'_>,
    stderr: &mut dyn Write,
) -> Result<()> {
    context.platform.check(&[PlatformStep::Build])?;
    context.progress(stderr, format!("Building {}...", context.layout.project));
    builder.build(context.layout)
}

/// Promotes build output into the local staging tree for every planned
/// module.
///
/// # Errors
///
/// Returns planning errors and fatal filesystem failures. Missing artifacts
/// are warnings in the returned report.
pub fn stage_modules(context: &PipelineContext<'_>, stderr: &mut dyn Write) -> Result<RunReport> {
    let modules = context.plan()?;
    context.platform.check(&[PlatformStep::StageLocal])?;

    let staging_root = &context.layout.staging_root;
    context.progress(stderr, format!("Staging modules into {staging_root}..."));

    let promoter = Promoter::new(context.layout, context.platform, context.jobs);
    let mut report = RunReport::new(context.platform, context.layout.project.clone());
    for module in &modules {
        let result = promoter.promote(module, Stage::BuildOutput, Stage::LocalStaging)?;
        record(&mut report, &result);
        if let Some(summary) = report.staged.last() {
            context.progress(stderr, module_line(summary));
        }
    }

    context.progress(stderr, staged_message(modules.len(), staging_root));
    Ok(report)
}

/// Replaces the system installation with the staged artifacts of every
/// planned module and refreshes the aliases.
///
/// The run holds the installation lock from the wipe until the last alias.
/// A failed required alias fails the run, but only after every alias has
/// been attempted.
///
/// # Errors
///
/// Returns [`InstallerError::Unsupported`] before touching anything on
/// platforms without a system installation, and any fatal error raised by
/// the root manager, the lock, the promoter or a required alias.
pub fn install_modules(
    context: &PipelineContext<'_>,
    stderr: &mut dyn Write,
) -> Result<RunReport> {
    let modules = context.plan()?;
    context.platform.check(&PlatformStep::INSTALL)?;

    let layout = context.layout;
    let root = InstallationRoot::new(layout.system_root.clone());
    let manager = RootManager::new(context.platform);
    manager.ensure(&root)?;

    let lock = InstallLock::acquire(root.path(), &format!("jamoma-installer install {}", layout.project))?;
    log::debug!("holding {}", lock.path());

    context.progress(stderr, format!("Cleaning {}...", root.path()));
    manager.clean(&root)?;
    manager.ensure(&root)?;

    let promoter = Promoter::new(layout, context.platform, context.jobs);
    let mut report = RunReport::new(context.platform, layout.project.clone());
    for module in &modules {
        let result = promoter.promote(module, Stage::LocalStaging, Stage::SystemRoot)?;
        record(&mut report, &result);
        if let Some(summary) = report.installed.last() {
            context.progress(stderr, module_line(summary));
        }
    }
    report.purged = root.purge_backups()?;

    let linker = AliasLinker::new(context.platform);
    let requests = alias_requests(&modules, layout, context.platform);
    let keep: BTreeSet<_> = requests
        .iter()
        .map(|request| request.canonical.clone())
        .collect();
    report.pruned = linker.prune_stale(&layout.alias_dir, root.path(), &keep)?;

    context.progress(stderr, format!("Linking aliases in {}...", layout.alias_dir));
    let failure = record_aliases(&mut report, linker.link_all(requests));
    for alias in &report.aliases {
        context.progress(stderr, alias_line(alias));
    }

    if let Some(err) = failure {
        return Err(err);
    }

    context.progress(stderr, success_message(modules.len(), root.path()));
    Ok(report)
}

fn record(report: &mut RunReport, result: &PromotionResult) {
    for warning in result.warnings() {
        if matches!(warning, Warning::ArtifactMissing { .. }) {
            log::warn!("{warning}");
        }
    }
    report.record_promotion(result);
}

/// Fold alias outcomes into `report`, returning the first required failure.
fn record_aliases(report: &mut RunReport, outcomes: Vec<AliasOutcome>) -> Option<InstallerError> {
    let mut failure = None;
    for AliasOutcome { request, result } in outcomes {
        let error = match result {
            Ok(()) => None,
            Err(err) => {
                let reason = err.to_string();
                if !request.required {
                    report.warnings.push(Warning::OptionalAliasFailed {
                        module: request.module.clone(),
                        alias: request.canonical.clone(),
                        reason: reason.clone(),
                    });
                } else if failure.is_none() {
                    failure = Some(err);
                }
                Some(reason)
            }
        };
        report.aliases.push(AliasReport {
            module: request.module,
            alias: request.canonical,
            target: request.target,
            linked: error.is_none(),
            error,
        });
    }
    failure
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
