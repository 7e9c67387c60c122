//! Test utilities and mocks for quay unit tests.
//!
//! The central piece is [`MockExecutor`], a scripted [`CommandRunner`]: each
//! expectation matches a command line and returns a canned output, so a
//! whole leg can run without any real toolchain installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use quay::test_support::{MockExecutor, MockProcessOutput};
//!
//! let exec = MockExecutor::new();
//! exec.expect_prefix("cmake -S", MockProcessOutput::success(""));
//! exec.expect("make -j2", MockProcessOutput::failure(2, "link error"));
//! ```

pub mod fixtures;

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::process::{CommandRunner, ProcessBuilder, ProcessOutput};

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Simulate a process killed for exceeding its limit.
    pub timed_out: bool,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Create an output with both stdout and stderr.
    pub fn with_output(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// A process that was killed at its deadline.
    pub fn timeout() -> Self {
        MockProcessOutput {
            status: -1,
            stdout: String::new(),
            stderr: "TIMEOUT: Process terminated after 0 seconds.".to_string(),
            timed_out: true,
        }
    }

    /// What a smoke run prints: status, then title.
    pub fn smoke(status: i32, reported: &str, title: &str) -> Self {
        MockProcessOutput::success(format!("{}\n{}\n", reported, title)).with_status(status)
    }

    fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    fn to_process_output(&self) -> ProcessOutput {
        ProcessOutput {
            code: if self.timed_out {
                None
            } else {
                Some(self.status)
            },
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            timed_out: self.timed_out,
            duration: Duration::ZERO,
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<ProcessBuilder>,
    default_output: Option<MockProcessOutput>,
}

/// Scripted command runner.
///
/// Commands are matched on `<program file name> <args...>`, so expectations
/// do not depend on where a tool was resolved. Unmatched commands behave
/// like a program that cannot be spawned.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor::default()
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add a custom expectation.
    pub fn expect_pattern(&self, expectation: CommandExpectation) -> &Self {
        self.lock().expectations.push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&self, output: MockProcessOutput) -> &Self {
        self.lock().default_output = Some(output);
        self
    }

    /// Command lines that were run, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(command_key).collect()
    }

    /// Full builders that were run, in order.
    pub fn commands(&self) -> Vec<ProcessBuilder> {
        self.lock().calls.clone()
    }

    /// Whether any call starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.lock().expectations.iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} was used {} times, expected {}",
                        i,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CommandRunner for MockExecutor {
    fn run(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        let key = command_key(cmd);
        let mut state = self.lock();
        state.calls.push(cmd.clone());

        for exp in &mut state.expectations {
            if exp.pattern.matches(&key) && exp.available() {
                exp.used += 1;
                return Ok(exp.output.to_process_output());
            }
        }

        if let Some(ref default) = state.default_output {
            return Ok(default.to_process_output());
        }

        bail!("unexpected command: {}", key)
    }
}

/// `<program file name> <args...>`
fn command_key(cmd: &ProcessBuilder) -> String {
    let program = cmd
        .get_program()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cmd.get_program().display().to_string());
    let program = program
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(program);

    let mut parts = vec![program];
    parts.extend(cmd.get_args().iter().cloned());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_executor_matches_file_name() {
        let exec = MockExecutor::new();
        exec.expect("make -j2", MockProcessOutput::success("built"));

        let out = exec
            .run(&ProcessBuilder::new("/opt/tools/make").arg("-j2"))
            .unwrap();
        assert_eq!(out.stdout, "built");
        assert_eq!(exec.calls(), vec!["make -j2"]);
    }

    #[test]
    fn test_mock_executor_unexpected_is_error() {
        let exec = MockExecutor::new();
        assert!(exec.run(&ProcessBuilder::new("cmake")).is_err());
        assert!(exec.called("cmake"));
    }

    #[test]
    fn test_mock_executor_times() {
        let exec = MockExecutor::new();
        exec.expect_pattern(
            CommandExpectation::new(
                CommandPattern::StartsWith("npm".to_string()),
                MockProcessOutput::failure(1, "E404"),
            )
            .times(1),
        );
        exec.set_default(MockProcessOutput::success(""));

        let cmd = ProcessBuilder::new("npm").arg("install");
        assert_eq!(exec.run(&cmd).unwrap().code, Some(1));
        assert_eq!(exec.run(&cmd).unwrap().code, Some(0));
        exec.verify().unwrap();
    }

    #[test]
    fn test_timeout_output() {
        let out = MockProcessOutput::timeout().to_process_output();
        assert!(out.timed_out);
        assert_eq!(out.code, None);
    }
}
