//! Delegation to the external build command.
//!
//! The installer never compiles anything itself. It runs the project's own
//! build script with the active module name in the child's environment and
//! waits, with a timeout, for it to finish.

use crate::config::{BuildSettings, PROJECT_ENV_VAR};
use crate::error::{InstallerError, Result};
use crate::stage::StageLayout;
use camino::Utf8PathBuf;
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// A fully resolved external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    /// Program to run.
    pub program: String,
    /// Arguments to pass.
    pub args: Vec<String>,
    /// Directory to run in.
    pub working_dir: Utf8PathBuf,
    /// Extra environment for the child only.
    pub env: Vec<(String, String)>,
    /// How long to wait before killing the child.
    pub timeout: Duration,
}

/// How an external command ended.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The command exited on its own.
    Completed(Output),
    /// The command was killed after the timeout.
    TimedOut,
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Run `invocation` to completion or until its timeout.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or waiting.
    fn run(&self, invocation: &BuildInvocation) -> Result<CommandOutcome>;
}

/// Executes commands on the host system.
///
/// Both output streams are drained on helper threads while the child runs,
/// so a chatty build cannot block on a full pipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, invocation: &BuildInvocation) -> Result<CommandOutcome> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(invocation.working_dir.as_std_path())
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = child.wait_timeout(invocation.timeout)? else {
            kill(&mut child);
            return Ok(CommandOutcome::TimedOut);
        };

        Ok(CommandOutcome::Completed(Output {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        }))
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    stream.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(err) = reader.read_to_end(&mut buffer) {
                log::debug!("stopped reading build output: {err}");
            }
            buffer
        })
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        log::debug!("could not kill timed-out build: {err}");
    }
    if let Err(err) = child.wait() {
        log::debug!("could not reap timed-out build: {err}");
    }
}

/// Runs the configured build command for the active module.
pub struct Builder<'a> {
    executor: &'a dyn CommandExecutor,
    settings: &'a BuildSettings,
}

impl<'a> Builder<'a> {
    /// Create a builder using `executor` and `settings`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, settings: &'a BuildSettings) -> Self {
        Self { executor, settings }
    }

    /// The invocation that [`Builder::build`] would run for `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidConfig`] if the command is empty.
    pub fn invocation(&self, layout: &StageLayout) -> Result<BuildInvocation> {
        let Some((program, args)) = self.settings.command.split_first() else {
            return Err(InstallerError::InvalidConfig {
                path: Utf8PathBuf::from("[build]"),
                reason: "build.command must name a program".to_owned(),
            });
        };

        Ok(BuildInvocation {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: layout.project_dir.join(&self.settings.working_dir),
            env: vec![(PROJECT_ENV_VAR.to_owned(), layout.project.to_string())],
            timeout: self.settings.timeout(),
        })
    }

    /// Run the build and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::BuildFailed`] if the command cannot start or
    /// exits unsuccessfully, and [`InstallerError::BuildTimedOut`] if it runs
    /// past the timeout.
    pub fn build(&self, layout: &StageLayout) -> Result<()> {
        let invocation = self.invocation(layout)?;
        let module = layout.project.clone();
        log::info!(
            "building {module}: {} {} (in {})",
            invocation.program,
            invocation.args.join(" "),
            invocation.working_dir
        );

        let outcome = self.executor.run(&invocation).map_err(|err| match err {
            InstallerError::Io(source) => InstallerError::BuildFailed {
                module: module.clone(),
                reason: format!("could not start {}: {source}", invocation.program),
            },
            other => other,
        })?;

        let output = match outcome {
            CommandOutcome::Completed(output) => output,
            CommandOutcome::TimedOut => {
                return Err(InstallerError::BuildTimedOut {
                    module,
                    timeout_secs: invocation.timeout.as_secs(),
                });
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log::debug!("[{module}] {line}");
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => format!("{} exited with {}", invocation.program, output.status),
            trimmed => trimmed.to_owned(),
        };
        Err(InstallerError::BuildFailed { module, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleName;
    use crate::test_utils::{failure_output, success_output};
    use camino::Utf8Path;
    use rstest::{fixture, rstest};

    #[fixture]
    fn layout() -> StageLayout {
        StageLayout::conventional(ModuleName::from("Modular"), Utf8Path::new("/src/Modular"))
    }

    #[rstest]
    fn invocation_runs_in_support_with_project_env(layout: StageLayout) {
        let settings = BuildSettings::default();
        let executor = MockCommandExecutor::new();
        let invocation = Builder::new(&executor, &settings)
            .invocation(&layout)
            .expect("invocation");

        assert_eq!(invocation.program, "ruby");
        assert_eq!(invocation.args, vec!["build.rb"]);
        assert_eq!(invocation.working_dir, Utf8PathBuf::from("/src/Modular/support"));
        assert_eq!(
            invocation.env,
            vec![("JAMOMAPROJECT".to_owned(), "Modular".to_owned())]
        );
        assert_eq!(invocation.timeout, Duration::from_secs(1800));
    }

    #[rstest]
    fn successful_build_is_ok(layout: StageLayout) {
        let settings = BuildSettings::default();
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|invocation| invocation.program == "ruby")
            .times(1)
            .returning(|_| Ok(CommandOutcome::Completed(success_output())));

        Builder::new(&executor, &settings)
            .build(&layout)
            .expect("build should succeed");
    }

    #[rstest]
    fn failing_build_reports_trimmed_stderr(layout: StageLayout) {
        let settings = BuildSettings::default();
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_| Ok(CommandOutcome::Completed(failure_output("  xcodebuild failed\n"))));

        let err = Builder::new(&executor, &settings)
            .build(&layout)
            .expect_err("build should fail");

        match err {
            InstallerError::BuildFailed { module, reason } => {
                assert_eq!(module.as_str(), "Modular");
                assert_eq!(reason, "xcodebuild failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    fn timed_out_build_is_reported(layout: StageLayout) {
        let settings = BuildSettings {
            timeout_secs: 5,
            ..BuildSettings::default()
        };
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .returning(|_| Ok(CommandOutcome::TimedOut));

        let err = Builder::new(&executor, &settings)
            .build(&layout)
            .expect_err("build should time out");

        assert!(matches!(
            err,
            InstallerError::BuildTimedOut { timeout_secs: 5, .. }
        ));
    }

    #[rstest]
    fn spawn_failure_becomes_build_failure(layout: StageLayout) {
        let settings = BuildSettings::default();
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().returning(|_| {
            Err(InstallerError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )))
        });

        let err = Builder::new(&executor, &settings)
            .build(&layout)
            .expect_err("spawn should fail");

        assert!(matches!(err, InstallerError::BuildFailed { reason, .. } if reason.contains("could not start ruby")));
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_passes_environment_and_captures_output() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let invocation = BuildInvocation {
            program: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                "echo \"$JAMOMAPROJECT\"; echo oops >&2; exit 3".to_owned(),
            ],
            working_dir: Utf8PathBuf::from_path_buf(temp.path().to_owned()).expect("utf8"),
            env: vec![("JAMOMAPROJECT".to_owned(), "Score".to_owned())],
            timeout: Duration::from_secs(30),
        };

        let outcome = SystemCommandExecutor.run(&invocation).expect("run");

        let CommandOutcome::Completed(output) = outcome else {
            panic!("command should complete");
        };
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Score");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_kills_on_timeout() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let invocation = BuildInvocation {
            program: "sleep".to_owned(),
            args: vec!["30".to_owned()],
            working_dir: Utf8PathBuf::from_path_buf(temp.path().to_owned()).expect("utf8"),
            env: Vec::new(),
            timeout: Duration::from_millis(100),
        };

        let outcome = SystemCommandExecutor.run(&invocation).expect("run");

        assert!(matches!(outcome, CommandOutcome::TimedOut));
    }
}
