//! CLI argument definitions for the Jamoma installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Build, stage, and install the Jamoma module suite.
#[derive(Parser, Debug)]
#[command(name = "jamoma-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build, stage, and install the Jamoma module suite.\n\n",
    "Every Jamoma module (Foundation, DSP, Modular, Score) is installed the same ",
    "way: its build output is staged locally, then copied into the shared system ",
    "root, and every library and plugin bundle is aliased into the shared library ",
    "location. Upstream modules are always processed before the modules that ",
    "depend on them.\n\n",
    "The active module comes from --project, then JAMOMAPROJECT, then the ",
    "configuration file, then the name of the project directory.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Build DSP and stage it with its upstream modules:\n",
    "    $ jamoma-installer --project-dir ~/src/Jamoma/DSP build\n\n",
    "  Stage already-built output without running the build:\n",
    "    $ jamoma-installer build --skip-compile\n\n",
    "  Install the staged modules system-wide:\n",
    "    $ sudo jamoma-installer install\n\n",
    "  Preview the plan without touching anything:\n",
    "    $ jamoma-installer --dry-run build-and-install\n\n",
    "  Emit a machine-readable report:\n",
    "    $ jamoma-installer --json install\n\n",
    "Logging can be tuned with JAMOMA_INSTALLER_LOG (e.g. jamoma_installer=debug).",
))]
pub struct Cli {
    /// Action to perform.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every action.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the build and stage the project with its upstream modules.
    Build(BuildArgs),

    /// Install the staged modules into the system root and link aliases.
    Install,

    /// Build, then install.
    BuildAndInstall(BuildArgs),
}

impl Command {
    /// Subcommand name as typed on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Install => "install",
            Self::BuildAndInstall(_) => "build-and-install",
        }
    }

    /// Build options, for actions that build.
    #[must_use]
    pub const fn build_args(&self) -> Option<&BuildArgs> {
        match self {
            Self::Build(args) | Self::BuildAndInstall(args) => Some(args),
            Self::Install => None,
        }
    }

    /// Whether the action installs into the system root.
    #[must_use]
    pub const fn installs(&self) -> bool {
        matches!(self, Self::Install | Self::BuildAndInstall(_))
    }
}

/// Arguments for the build step.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArgs {
    /// Skip the external build command and only stage existing output.
    #[arg(long)]
    pub skip_compile: bool,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Project directory of the active module [default: current directory].
    #[arg(long, value_name = "DIR", global = true)]
    pub project_dir: Option<Utf8PathBuf>,

    /// Active module name.
    #[arg(long, value_name = "NAME", global = true)]
    pub project: Option<String>,

    /// Configuration file to use instead of the discovered one.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Number of parallel copy workers per module.
    #[arg(short, long, value_name = "N", global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Show the resolved plan and exit without side effects.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        global = true
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity", global = true)]
    pub quiet: bool,
}

impl GlobalArgs {
    /// The requested worker count, if any.
    #[must_use]
    pub fn jobs(&self) -> Option<usize> {
        self.jobs.map(usize::from)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
