//! Shared test utilities for the installer crate.

use crate::builder::{BuildInvocation, CommandExecutor, CommandOutcome};
use crate::error::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// An expected build invocation and the outcome to report for it.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program expected to run (e.g., "ruby").
    pub program: &'static str,
    /// The value `JAMOMAPROJECT` must carry, if checked.
    pub project: Option<&'static str>,
    /// The outcome to return when this invocation happens.
    pub result: Result<CommandOutcome>,
}

impl ExpectedCall {
    /// A successful run of `program` for `project`.
    pub fn succeeds(program: &'static str, project: &'static str) -> Self {
        Self {
            program,
            project: Some(project),
            result: Ok(CommandOutcome::Completed(success_output())),
        }
    }

    /// A failing run of `program` that prints `stderr`.
    pub fn fails(program: &'static str, stderr: &str) -> Self {
        Self {
            program,
            project: None,
            result: Ok(CommandOutcome::Completed(failure_output(stderr))),
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected build invocations and returns predefined outcomes,
/// allowing tests to drive the build step without spawning anything.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    seen: RefCell<Vec<BuildInvocation>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Invocations received so far.
    pub fn invocations(&self) -> Vec<BuildInvocation> {
        self.seen.borrow().clone()
    }

    /// Asserts that all expected invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further build invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, invocation: &BuildInvocation) -> Result<CommandOutcome> {
        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .expect("unexpected build invocation");

        assert_eq!(call.program, invocation.program);
        if let Some(project) = call.project {
            let env = invocation
                .env
                .iter()
                .find(|(key, _)| key == "JAMOMAPROJECT")
                .map(|(_, value)| value.as_str());
            assert_eq!(env, Some(project));
        }

        self.seen.borrow_mut().push(invocation.clone());
        call.result
    }
}
