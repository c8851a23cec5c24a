//! Jamoma installer CLI entrypoint.
//!
//! This binary builds a Jamoma module, stages it together with its upstream
//! modules, and installs the staged artifacts into the shared system root
//! with aliases in the shared library location.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use jamoma_installer::builder::{Builder, CommandExecutor, SystemCommandExecutor};
use jamoma_installer::cli::{Cli, GlobalArgs};
use jamoma_installer::config::{
    InstallerConfig, LoadedConfig, PROJECT_ENV_VAR, resolve_project_dir,
};
use jamoma_installer::dirs::{NoBaseDirs, SystemBaseDirs};
use jamoma_installer::error::{InstallerError, Result};
use jamoma_installer::output::{DryRunInfo, write_stderr_line};
use jamoma_installer::pipeline::{PipelineContext, compile, install_modules, stage_modules};
use jamoma_installer::platform::{self, PlatformStep};
use jamoma_installer::report::RunReport;
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter.
const LOG_ENV_VAR: &str = "JAMOMA_INSTALLER_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let env_project = env_project();
    let run_result = run(
        &cli,
        env_project.as_deref(),
        &SystemCommandExecutor,
        &mut stdout,
        &mut stderr,
    );
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Reads the active module name from the environment.
///
/// This is the only place the orchestrator looks at `JAMOMAPROJECT`.
fn env_project() -> Option<String> {
    std::env::var(PROJECT_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn default_log_level(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        return "error";
    }
    match global.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(global)));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init()
    {
        log::debug!("keeping the existing log subscriber: {err}");
    }
}

fn run(
    cli: &Cli,
    env_project: Option<&str>,
    executor: &dyn CommandExecutor,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    let cwd = current_dir()?;
    let project_dir = resolve_project_dir(cli.global.project_dir.as_deref(), &cwd)?;
    let loaded = load_config(cli, &project_dir)?;
    let config = &loaded.config;

    let project = config.resolve_project(cli.global.project.as_deref(), env_project, &project_dir)?;
    let platform = config.platform_or(platform::resolve)?;
    let catalog = config.catalog()?;
    let layout = config.layout(project, &project_dir);
    let context = PipelineContext {
        platform,
        layout: &layout,
        catalog: &catalog,
        jobs: config.jobs(cli.global.jobs()),
        quiet: cli.global.quiet,
    };

    if cli.global.dry_run {
        return print_dry_run_info(cli, &context, &loaded, stderr);
    }

    // Refuse the whole command before the build writes anything.
    context.plan()?;
    platform.check(&planned_steps(cli))?;

    let mut report = RunReport::new(platform, layout.project.clone());
    if let Some(args) = cli.command.build_args() {
        if !args.skip_compile {
            compile(&context, &Builder::new(executor, &config.build), stderr)?;
            report.built = true;
        }
        report.absorb(stage_modules(&context, stderr)?);
    }
    if cli.command.installs() {
        report.absorb(install_modules(&context, stderr)?);
    }

    if cli.global.json {
        writeln!(stdout, "{}", report.to_json()?)
            .map_err(|source| InstallerError::WriteFailed { source })?;
    }
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| InstallerError::ProjectNotFound {
        reason: format!("current directory {} is not valid UTF-8", path.display()),
    })
}

fn load_config(cli: &Cli, project_dir: &Utf8Path) -> Result<LoadedConfig> {
    let explicit = cli.global.config.as_deref();
    SystemBaseDirs::new().map_or_else(
        || InstallerConfig::discover(explicit, project_dir, &NoBaseDirs),
        |dirs| InstallerConfig::discover(explicit, project_dir, &dirs),
    )
}

/// Platform steps the selected command performs, in execution order.
fn planned_steps(cli: &Cli) -> Vec<PlatformStep> {
    let mut steps = Vec::new();
    if let Some(args) = cli.command.build_args() {
        if !args.skip_compile {
            steps.push(PlatformStep::Build);
        }
        steps.push(PlatformStep::StageLocal);
    }
    if cli.command.installs() {
        steps.extend(PlatformStep::INSTALL);
    }
    steps
}

/// Prints the resolved plan without side effects.
fn print_dry_run_info(
    cli: &Cli,
    context: &PipelineContext<'_>,
    loaded: &LoadedConfig,
    stderr: &mut dyn Write,
) -> Result<()> {
    let modules = context.planned_names()?;
    let steps = planned_steps(cli);
    let builds = steps.contains(&PlatformStep::Build);

    let info = DryRunInfo {
        action: cli.command.name(),
        platform: context.platform,
        project: &context.layout.project,
        project_dir: &context.layout.project_dir,
        staging_root: &context.layout.staging_root,
        system_root: &context.layout.system_root,
        alias_dir: &context.layout.alias_dir,
        jobs: context.jobs,
        config_source: loaded.source.as_deref(),
        build_command: builds.then(|| loaded.config.build.command.join(" ")),
        modules: &modules,
        steps: &steps,
    };
    write_stderr_line(stderr, info.display_text());
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
