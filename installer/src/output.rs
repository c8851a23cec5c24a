//! Output formatting for the installer CLI.
//!
//! Progress and summaries are human-readable lines on stderr. Stdout is kept
//! free for the `--json` run report.

use crate::catalog::ModuleName;
use crate::platform::{PlatformKind, PlatformStep};
use crate::report::{AliasReport, ModuleReport};
use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress output; a closed stderr must not abort a run.
    }
}

/// Format a success message after installation.
#[must_use]
pub fn success_message(count: usize, system_root: &Utf8Path) -> String {
    let plural = if count == 1 { "module" } else { "modules" };
    format!("Successfully installed {count} {plural} to {system_root}")
}

/// Format a success message after local staging.
#[must_use]
pub fn staged_message(count: usize, staging_root: &Utf8Path) -> String {
    let plural = if count == 1 { "module" } else { "modules" };
    format!("Staged {count} {plural} in {staging_root}")
}

/// One summary line per promoted module.
///
/// # Example
///
/// ```
/// use jamoma_installer::catalog::ModuleName;
/// use jamoma_installer::descriptor::ArtifactKind;
/// use jamoma_installer::output::module_line;
/// use jamoma_installer::report::ModuleReport;
/// use jamoma_installer::stage::Stage;
///
/// let report = ModuleReport {
///     module: ModuleName::from("DSP"),
///     from: Stage::LocalStaging,
///     to: Stage::SystemRoot,
///     kinds: vec![ArtifactKind::Library],
///     files: 1,
///     missing: Vec::new(),
/// };
///
/// assert_eq!(module_line(&report), "  DSP: library (1 file)");
/// ```
#[must_use]
pub fn module_line(report: &ModuleReport) -> String {
    let files = if report.files == 1 { "file" } else { "files" };
    let kinds = if report.kinds.is_empty() {
        "nothing".to_owned()
    } else {
        report
            .kinds
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut line = format!("  {}: {kinds} ({} {files})", report.module, report.files);
    if !report.missing.is_empty() {
        line.push_str(&format!("; missing {}", report.missing.join(", ")));
    }
    line
}

/// One line per alias outcome.
#[must_use]
pub fn alias_line(report: &AliasReport) -> String {
    match &report.error {
        None => format!("  {} -> {}", report.alias, report.target),
        Some(error) => format!("  {} FAILED: {error}", report.alias),
    }
}

/// Configuration information for dry-run output.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use jamoma_installer::catalog::ModuleName;
/// use jamoma_installer::output::DryRunInfo;
/// use jamoma_installer::platform::{PlatformKind, PlatformStep};
///
/// let project_dir = Utf8PathBuf::from("/src/DSP");
/// let staging = Utf8PathBuf::from("/src/DSP/support/jamoma");
/// let root = Utf8PathBuf::from("/usr/local/jamoma");
/// let alias_dir = Utf8PathBuf::from("/usr/local/lib");
/// let modules = vec![ModuleName::from("Foundation"), ModuleName::from("DSP")];
///
/// let info = DryRunInfo {
///     action: "install",
///     platform: PlatformKind::MacLike,
///     project: &modules[1],
///     project_dir: &project_dir,
///     staging_root: &staging,
///     system_root: &root,
///     alias_dir: &alias_dir,
///     jobs: 4,
///     config_source: None,
///     build_command: None,
///     modules: &modules,
///     steps: &PlatformStep::INSTALL,
/// };
///
/// let output = info.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("1. Foundation"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Subcommand being previewed.
    pub action: &'a str,
    /// Resolved platform.
    pub platform: PlatformKind,
    /// Active module.
    pub project: &'a ModuleName,
    /// Project directory.
    pub project_dir: &'a Utf8Path,
    /// Local staging root.
    pub staging_root: &'a Utf8Path,
    /// System installation root.
    pub system_root: &'a Utf8Path,
    /// Alias location.
    pub alias_dir: &'a Utf8Path,
    /// Copy worker threads per module.
    pub jobs: usize,
    /// Configuration file in effect, if any.
    pub config_source: Option<&'a Utf8Path>,
    /// External build command line, if the action runs it.
    pub build_command: Option<String>,
    /// Modules in processing order.
    pub modules: &'a [ModuleName],
    /// Platform-conditional steps the action performs.
    pub steps: &'a [PlatformStep],
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut lines = vec![
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Action: {}", self.action),
            format!("Platform: {}", self.platform),
            format!("Project: {}", self.project),
            format!("Project directory: {}", self.project_dir),
            format!("Staging root: {}", self.staging_root),
            format!("System root: {}", self.system_root),
            format!("Alias directory: {}", self.alias_dir),
            format!("Parallel jobs: {}", self.jobs),
            format!(
                "Configuration: {}",
                self.config_source
                    .map_or_else(|| "built-in defaults".to_owned(), ToString::to_string)
            ),
        ];

        if let Some(command) = &self.build_command {
            lines.push(format!("Build command: {command}"));
        }

        lines.push(String::new());
        lines.push("Modules in order:".to_owned());
        for (position, module) in self.modules.iter().enumerate() {
            lines.push(format!("  {}. {module}", position + 1));
        }

        lines.push(String::new());
        lines.push("Steps:".to_owned());
        for step in self.steps {
            let marker = if self.platform.supports(*step) {
                ""
            } else {
                " (unsupported)"
            };
            lines.push(format!("  - {step}{marker}"));
        }

        lines.join("\n")
    }
}
