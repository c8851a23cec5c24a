//! Warnings and the run report.
//!
//! Nothing in here is fatal. The report is what an operator reads after a
//! run: which modules moved which artifact kinds, what was missing and how
//! every alias fared. With `--json` it is printed verbatim on stdout.

use crate::catalog::ModuleName;
use crate::descriptor::ArtifactKind;
use crate::error::{InstallerError, Result};
use crate::platform::PlatformKind;
use crate::promoter::PromotionResult;
use crate::stage::Stage;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;

/// A recoverable condition collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    /// A descriptor matched no files in the source stage.
    ArtifactMissing {
        /// Module declaring the descriptor.
        module: ModuleName,
        /// Stage the files were looked for in.
        stage: Stage,
        /// Kind of the missing artifact.
        artifact: ArtifactKind,
        /// Expanded pattern that matched nothing.
        pattern: String,
        /// Whether the descriptor is optional.
        optional: bool,
    },
    /// A promotion copied no files at all.
    EmptyPromotion {
        /// Module that was promoted.
        module: ModuleName,
        /// Source stage.
        from: Stage,
        /// Destination stage.
        to: Stage,
    },
    /// An alias for an optional artifact could not be created.
    OptionalAliasFailed {
        /// Module owning the artifact.
        module: ModuleName,
        /// Canonical alias location.
        alias: Utf8PathBuf,
        /// Why linking failed.
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtifactMissing {
                module,
                stage,
                artifact,
                pattern,
                optional,
            } => {
                let qualifier = if *optional { "optional " } else { "" };
                write!(
                    f,
                    "{module}: {qualifier}{artifact} {pattern} not found in {stage}"
                )
            }
            Self::EmptyPromotion { module, from, to } => {
                write!(f, "{module}: nothing promoted from {from} to {to}")
            }
            Self::OptionalAliasFailed {
                module,
                alias,
                reason,
            } => write!(f, "{module}: optional alias {alias} skipped: {reason}"),
        }
    }
}

/// Summary of one module's promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    /// The promoted module.
    pub module: ModuleName,
    /// Source stage.
    pub from: Stage,
    /// Destination stage.
    pub to: Stage,
    /// Artifact kinds that had at least one file copied.
    pub kinds: Vec<ArtifactKind>,
    /// Number of files copied.
    pub files: usize,
    /// Patterns that matched nothing.
    pub missing: Vec<String>,
}

impl From<&PromotionResult> for ModuleReport {
    fn from(result: &PromotionResult) -> Self {
        Self {
            module: result.module.clone(),
            from: result.from,
            to: result.to,
            kinds: result.promoted_kinds(),
            files: result.promoted.len(),
            missing: result
                .missing
                .iter()
                .map(|missing| missing.pattern.clone())
                .collect(),
        }
    }
}

/// Outcome of one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasReport {
    /// Module owning the artifact.
    pub module: ModuleName,
    /// Canonical alias location.
    pub alias: Utf8PathBuf,
    /// Artifact the alias points at.
    pub target: Utf8PathBuf,
    /// Whether the alias was created.
    pub linked: bool,
    /// Failure description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a run did, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Platform the run resolved.
    pub platform: PlatformKind,
    /// The active module.
    pub project: ModuleName,
    /// Whether the external build command ran.
    pub built: bool,
    /// BuildOutput to LocalStaging promotions.
    pub staged: Vec<ModuleReport>,
    /// LocalStaging to SystemRoot promotions.
    pub installed: Vec<ModuleReport>,
    /// Stale aliases removed before linking.
    pub pruned: Vec<Utf8PathBuf>,
    /// Backup files removed from the installation root.
    pub purged: Vec<Utf8PathBuf>,
    /// One entry per alias.
    pub aliases: Vec<AliasReport>,
    /// Recoverable conditions.
    pub warnings: Vec<Warning>,
}

impl RunReport {
    /// Start an empty report.
    #[must_use]
    pub const fn new(platform: PlatformKind, project: ModuleName) -> Self {
        Self {
            platform,
            project,
            built: false,
            staged: Vec::new(),
            installed: Vec::new(),
            pruned: Vec::new(),
            purged: Vec::new(),
            aliases: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a promotion and the warnings it implies.
    pub fn record_promotion(&mut self, result: &PromotionResult) {
        self.warnings.extend(result.warnings());
        let summary = ModuleReport::from(result);
        if result.to == Stage::LocalStaging {
            self.staged.push(summary);
        } else {
            self.installed.push(summary);
        }
    }

    /// Fold another report's entries into this one.
    pub fn absorb(&mut self, other: Self) {
        self.built |= other.built;
        self.staged.extend(other.staged);
        self.installed.extend(other.installed);
        self.pruned.extend(other.pruned);
        self.purged.extend(other.purged);
        self.aliases.extend(other.aliases);
        self.warnings.extend(other.warnings);
    }

    /// Number of aliases created.
    #[must_use]
    pub fn linked_count(&self) -> usize {
        self.aliases.iter().filter(|alias| alias.linked).count()
    }

    /// Serialise the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::StagingFailed`] if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| InstallerError::StagingFailed {
            reason: format!("could not serialise run report: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promoter::{MissingArtifact, PromotedArtifact};

    fn promotion() -> PromotionResult {
        PromotionResult {
            module: ModuleName::from("DSP"),
            from: Stage::BuildOutput,
            to: Stage::LocalStaging,
            promoted: vec![PromotedArtifact {
                kind: ArtifactKind::Library,
                source: Utf8PathBuf::from("/src/DSP/library/build/JamomaDSP.dylib"),
                destination: Utf8PathBuf::from("/src/DSP/support/jamoma/lib/JamomaDSP.dylib"),
            }],
            missing: vec![MissingArtifact {
                kind: ArtifactKind::PluginBundle,
                pattern: "extensions/AnalysisLib/build/AnalysisLib.ttdylib".to_owned(),
                optional: false,
            }],
        }
    }

    #[test]
    fn record_promotion_collects_missing_artifacts() {
        let mut report = RunReport::new(PlatformKind::MacLike, ModuleName::from("DSP"));
        report.record_promotion(&promotion());

        assert_eq!(report.staged.len(), 1);
        assert!(report.installed.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report
            .warnings
            .first()
            .is_some_and(|w| w.to_string().contains("AnalysisLib.ttdylib not found")));
    }

    #[test]
    fn json_report_tags_warnings() {
        let mut report = RunReport::new(PlatformKind::MacLike, ModuleName::from("DSP"));
        report.record_promotion(&promotion());

        let json = report.to_json().expect("serialise");
        assert!(json.contains("\"kind\": \"artifact-missing\""));
        assert!(json.contains("\"platform\": \"mac-like\""));
    }

    #[test]
    fn absorb_keeps_execution_order() {
        let mut first = RunReport::new(PlatformKind::MacLike, ModuleName::from("DSP"));
        first.record_promotion(&promotion());
        let mut second = RunReport::new(PlatformKind::MacLike, ModuleName::from("DSP"));
        second.built = true;
        second.warnings.push(Warning::EmptyPromotion {
            module: ModuleName::from("Foundation"),
            from: Stage::LocalStaging,
            to: Stage::SystemRoot,
        });

        first.absorb(second);

        assert!(first.built);
        assert_eq!(first.warnings.len(), 2);
    }
}
