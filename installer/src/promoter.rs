//! Promotion of a module's artifacts from one stage to the next.
//!
//! Promotion is plan-then-copy. The promoter first works out every copy the
//! module needs, then runs the copies on a bounded set of scoped worker
//! threads and waits for all of them before reporting. Missing inputs are
//! collected as data; any other filesystem failure is fatal.

use crate::catalog::{Module, ModuleName};
use crate::descriptor::ArtifactKind;
use crate::error::{InstallerError, Result};
use crate::fsops::{self, FsResult};
use crate::manifest::{StagedDescriptor, StagingManifest};
use crate::platform::{PlatformKind, PlatformStep};
use crate::report::Warning;
use crate::stage::{Stage, StageLayout};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;

/// One file copied by a promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedArtifact {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Where the file was copied from.
    pub source: Utf8PathBuf,
    /// Where the file now lives.
    pub destination: Utf8PathBuf,
}

/// A descriptor, or a staged file, that could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingArtifact {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Expanded pattern or file path that matched nothing.
    pub pattern: String,
    /// Whether the descriptor is optional.
    pub optional: bool,
}

/// Outcome of promoting one module between two stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionResult {
    /// The promoted module.
    pub module: ModuleName,
    /// Source stage.
    pub from: Stage,
    /// Destination stage.
    pub to: Stage,
    /// Files copied, in destination order.
    pub promoted: Vec<PromotedArtifact>,
    /// Descriptors with nothing to copy.
    pub missing: Vec<MissingArtifact>,
}

impl PromotionResult {
    /// Artifact kinds with at least one copied file.
    #[must_use]
    pub fn promoted_kinds(&self) -> Vec<ArtifactKind> {
        self.promoted
            .iter()
            .map(|artifact| artifact.kind)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether no file was copied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty()
    }

    /// Warnings implied by this result.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        let mut warnings: Vec<Warning> = self
            .missing
            .iter()
            .map(|missing| Warning::ArtifactMissing {
                module: self.module.clone(),
                stage: self.from,
                artifact: missing.kind,
                pattern: missing.pattern.clone(),
                optional: missing.optional,
            })
            .collect();
        if self.is_empty() {
            warnings.push(Warning::EmptyPromotion {
                module: self.module.clone(),
                from: self.from,
                to: self.to,
            });
        }
        warnings
    }
}

#[derive(Debug, Clone)]
struct CopyJob {
    kind: ArtifactKind,
    optional: bool,
    source: Utf8PathBuf,
    destination: Utf8PathBuf,
}

/// Moves artifacts between adjacent stages of a [`StageLayout`].
#[derive(Debug, Clone)]
pub struct Promoter<'a> {
    layout: &'a StageLayout,
    platform: PlatformKind,
    jobs: usize,
}

impl<'a> Promoter<'a> {
    /// Create a promoter copying on up to `jobs` threads (at least one).
    #[must_use]
    pub fn new(layout: &'a StageLayout, platform: PlatformKind, jobs: usize) -> Self {
        Self {
            layout,
            platform,
            jobs: jobs.max(1),
        }
    }

    /// Promote `module` from `from` to `to`.
    ///
    /// A promotion that copies nothing is not an error; inspect
    /// [`PromotionResult::is_empty`].
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidPromotion`] unless `to` directly
    /// follows `from` and is not the alias location,
    /// [`InstallerError::Unsupported`] if the platform cannot perform the
    /// step, and [`InstallerError::PermissionDenied`] or
    /// [`InstallerError::StagingFailed`] when a copy fails.
    pub fn promote(&self, module: &Module, from: Stage, to: Stage) -> Result<PromotionResult> {
        let step = match (from, to) {
            (Stage::BuildOutput, Stage::LocalStaging) => PlatformStep::StageLocal,
            (Stage::LocalStaging, Stage::SystemRoot) => PlatformStep::PromoteSystem,
            _ => return Err(InstallerError::InvalidPromotion { from, to }),
        };
        self.platform.check(&[step])?;

        let (jobs, missing) = if step == PlatformStep::StageLocal {
            self.plan_local(module)?
        } else {
            self.plan_system(module)?
        };

        log::debug!(
            "promoting {} from {from} to {to}: {} file(s) planned",
            module.name,
            jobs.len()
        );

        let destination_root = self.layout.stage_root(to, &module.name);
        let kinds: BTreeSet<ArtifactKind> = jobs.iter().map(|job| job.kind).collect();
        for kind in kinds {
            fsops::ensure_dir(&StageLayout::subtree(&destination_root, kind))
                .map_err(|e| e.into_error("creating stage directory"))?;
        }

        let mut result = PromotionResult {
            module: module.name.clone(),
            from,
            to,
            promoted: Vec::new(),
            missing,
        };
        self.run_copies(jobs, &mut result)?;

        if to == Stage::LocalStaging {
            self.record_manifest(module, &result)?;
        }

        if result.is_empty() {
            log::warn!("{}: nothing promoted from {from} to {to}", module.name);
        }
        Ok(result)
    }

    /// Match every descriptor against the module's build output.
    fn plan_local(&self, module: &Module) -> Result<(Vec<CopyJob>, Vec<MissingArtifact>)> {
        let build_dir = self.layout.build_output_dir(&module.name);
        let staging = &self.layout.staging_root;
        let mut jobs = BTreeMap::new();
        let mut missing = Vec::new();

        for descriptor in &module.artifacts {
            let sources = descriptor
                .resolve_sources(&build_dir, self.platform)
                .map_err(|reason| InstallerError::StagingFailed { reason })?;
            if sources.is_empty() {
                missing.push(MissingArtifact {
                    kind: descriptor.kind,
                    pattern: descriptor.source_pattern(self.platform),
                    optional: descriptor.optional,
                });
                continue;
            }
            for source in sources {
                let Some(name) = source.file_name() else {
                    continue;
                };
                let destination = StageLayout::subtree(staging, descriptor.kind).join(name);
                jobs.entry(destination.clone()).or_insert(CopyJob {
                    kind: descriptor.kind,
                    optional: descriptor.optional,
                    source,
                    destination,
                });
            }
        }

        Ok((jobs.into_values().collect(), missing))
    }

    /// Replay the module's staging manifest against the system root.
    fn plan_system(&self, module: &Module) -> Result<(Vec<CopyJob>, Vec<MissingArtifact>)> {
        let manifest_path = self.layout.manifest_path(&module.name);
        let Some(manifest) = StagingManifest::load(&manifest_path)? else {
            log::info!("{} has no staging manifest; was it built?", module.name);
            let missing = module
                .artifacts
                .iter()
                .map(|descriptor| MissingArtifact {
                    kind: descriptor.kind,
                    pattern: descriptor.source_pattern(self.platform),
                    optional: descriptor.optional,
                })
                .collect();
            return Ok((Vec::new(), missing));
        };

        let staging = &self.layout.staging_root;
        let system = &self.layout.system_root;
        let mut jobs = BTreeMap::new();
        let mut missing = Vec::new();

        for entry in manifest.artifacts {
            if entry.files.is_empty() {
                missing.push(MissingArtifact {
                    kind: entry.kind,
                    pattern: entry.pattern,
                    optional: entry.optional,
                });
                continue;
            }
            for file in &entry.files {
                let destination = StageLayout::subtree(system, entry.kind).join(file);
                jobs.entry(destination.clone()).or_insert(CopyJob {
                    kind: entry.kind,
                    optional: entry.optional,
                    source: StageLayout::subtree(staging, entry.kind).join(file),
                    destination,
                });
            }
        }

        Ok((jobs.into_values().collect(), missing))
    }

    /// Copy every job and fold the outcomes into `result`.
    ///
    /// All copies finish before the first fatal failure is returned.
    fn run_copies(&self, jobs: Vec<CopyJob>, result: &mut PromotionResult) -> Result<()> {
        let outcomes = copy_in_parallel(&jobs, self.jobs)?;
        let mut fatal = None;

        for (job, outcome) in jobs.into_iter().zip(outcomes) {
            match outcome {
                Ok(bytes) => {
                    log::trace!("copied {} ({bytes} bytes)", job.destination);
                    result.promoted.push(PromotedArtifact {
                        kind: job.kind,
                        source: job.source,
                        destination: job.destination,
                    });
                }
                Err(failure) if failure.is_not_found() && !job.source.exists() => {
                    result.missing.push(MissingArtifact {
                        kind: job.kind,
                        pattern: job.source.into_string(),
                        optional: job.optional,
                    });
                }
                Err(failure) => {
                    log::debug!("copy to {} failed: {failure}", job.destination);
                    fatal.get_or_insert(failure);
                }
            }
        }

        match fatal {
            Some(failure) => Err(failure.into_error("promoting artifacts")),
            None => Ok(()),
        }
    }

    /// Write the staging manifest from a finished local promotion.
    fn record_manifest(&self, module: &Module, result: &PromotionResult) -> Result<()> {
        let build_dir = self.layout.build_output_dir(&module.name);
        let mut manifest = StagingManifest::new(module.name.clone());

        for descriptor in &module.artifacts {
            let pattern = descriptor.source_pattern(self.platform);
            let files = result
                .promoted
                .iter()
                .filter(|artifact| artifact.kind == descriptor.kind)
                .filter(|artifact| matches_pattern(&build_dir, &pattern, &artifact.source))
                .filter_map(|artifact| artifact.destination.file_name().map(str::to_owned))
                .collect();
            manifest.artifacts.push(StagedDescriptor {
                kind: descriptor.kind,
                pattern,
                optional: descriptor.optional,
                files,
            });
        }

        manifest.save(&self.layout.manifest_path(&module.name))
    }
}

/// Whether `source` is one of the files `pattern` matches below `base`.
fn matches_pattern(base: &Utf8Path, pattern: &str, source: &Utf8Path) -> bool {
    let Ok(relative) = source.strip_prefix(base) else {
        return false;
    };
    glob::Pattern::new(pattern)
        .is_ok_and(|compiled| compiled.matches_with(relative.as_str(), strict_path_matching()))
}

const fn strict_path_matching() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Run `jobs` on up to `workers` scoped threads, returning one outcome per
/// job in input order.
fn copy_in_parallel(jobs: &[CopyJob], workers: usize) -> Result<Vec<FsResult<u64>>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = jobs.len().div_ceil(workers.max(1));

    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(batch_size)
            .map(|batch| {
                scope.spawn(move || {
                    batch
                        .iter()
                        .map(|job| fsops::copy_preserving(&job.source, &job.destination))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut panicked = false;
        for handle in handles {
            match handle.join() {
                Ok(batch) => outcomes.extend(batch),
                Err(_) => panicked = true,
            }
        }
        if panicked {
            return Err(InstallerError::StagingFailed {
                reason: "a copy worker panicked".to_owned(),
            });
        }
        Ok(outcomes)
    })
}

#[cfg(test)]
#[path = "promoter_tests.rs"]
mod tests;
