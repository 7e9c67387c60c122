//! Subprocess execution utilities.
//!
//! Every external tool a leg runs goes through [`ProcessBuilder`]. Steps do
//! not spawn processes directly; they hand a builder to a [`CommandRunner`],
//! which lets tests substitute scripted outputs for real tools.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to keep draining pipes once a timed child has exited.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl AsRef<str>) -> Self {
        self.env_remove.push(key.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Set stdin data.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get an environment variable set on this builder.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(|v| v.as_str())
    }

    /// Get the working directory.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Get the wall-clock limit.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        // A timed process leads its own group so a timeout can kill
        // everything it started, not just the direct child.
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    /// Execute the command and wait for completion or timeout.
    ///
    /// Stdout and stderr are drained on separate threads so a child that
    /// writes a lot never blocks on a full pipe. With a timeout, the readers
    /// are abandoned shortly after the child exits, so a grandchild that
    /// keeps a pipe open cannot stall the caller.
    pub fn exec(&self) -> Result<ProcessOutput> {
        let start = Instant::now();
        let mut cmd = self.build_command();

        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running `{}`", self.display_command());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        if let Some(ref stdin_data) = self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let data = stdin_data.clone();
                thread::spawn(move || {
                    let _ = stdin.write_all(&data);
                });
            }
        }

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let (status, timed_out) = match self.timeout {
            Some(limit) => wait_with_timeout(&mut child, limit)
                .with_context(|| format!("failed to wait for `{}`", self.program.display()))?,
            None => (
                child
                    .wait()
                    .with_context(|| format!("failed to wait for `{}`", self.program.display()))?,
                false,
            ),
        };

        // Everything the child wrote is in the pipes by now; anything still
        // holding them open is a descendant we do not wait for.
        let drain_deadline = self.timeout.map(|_| Instant::now() + READER_GRACE);
        let stdout = finish_reader(stdout, drain_deadline);
        let mut stderr = finish_reader(stderr, drain_deadline);

        if timed_out {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("TIMEOUT: Process terminated after {} seconds.", secs));
        }

        Ok(ProcessOutput {
            code: if timed_out { None } else { status.code() },
            stdout,
            stderr,
            timed_out,
            duration: start.elapsed(),
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// A pipe being drained on a background thread.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(());
    });
    PipeReader { buf, done }
}

/// Wait for EOF (or `deadline`) and return whatever was read so far.
fn finish_reader(reader: Option<PipeReader>, deadline: Option<Instant>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match deadline {
        Some(deadline) => {
            let _ = reader
                .done
                .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        }
        None => {
            let _ = reader.done.recv();
        }
    }
    let bytes = reader.buf.lock().map(|b| b.clone()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> std::io::Result<(ExitStatus, bool)> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            kill_tree(child);
            let status = child.wait()?;
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child and every process in its group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let group = format!("-{}", child.id());
    let killed = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(killed, Ok(status) if status.success()) {
        tracing::debug!("could not signal process group {}", group);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or on timeout.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Non-empty stdout lines, trailing whitespace trimmed.
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// The last `n` lines of stderr, for failure messages.
    pub fn stderr_tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Executes processes on behalf of pipeline steps.
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion, honouring its timeout.
    ///
    /// Returns `Err` only when the process could not be spawned or waited
    /// on; a non-zero exit is a successful run with a failing output.
    fn run(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        cmd.exec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("cmake").args(["--build", "out", "-j4"]);

        assert_eq!(pb.display_command(), "cmake --build out -j4");
    }

    #[test]
    fn test_stdout_lines_skips_blank() {
        let out = ProcessOutput {
            code: Some(0),
            stdout: "success\n\nExample Domain\r\n".to_string(),
            stderr: String::new(),
            timed_out: false,
            duration: Duration::ZERO,
        };
        assert_eq!(out.stdout_lines(), vec!["success", "Example Domain"]);
    }

    #[test]
    fn test_stderr_tail() {
        let out = ProcessOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "a\nb\nc\nd".to_string(),
            timed_out: false,
            duration: Duration::ZERO,
        };
        assert_eq!(out.stderr_tail(2), "c\nd");
        assert_eq!(out.stderr_tail(10), "a\nb\nc\nd");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_captures_output() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo hello; echo oops >&2; exit 3"])
            .exec()
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_kills_on_timeout() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "exec sleep 5"])
            .timeout(Duration::from_millis(200))
            .exec()
            .unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.stderr.contains("TIMEOUT"));
        assert!(output.duration < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_grandchildren() {
        let start = Instant::now();
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo started; sleep 4; echo done"])
            .timeout(Duration::from_millis(200))
            .exec()
            .unwrap();

        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(output.stdout.contains("started"));
        assert!(!output.stdout.contains("done"));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_process_does_not_hold_exec() {
        // The shell exits at once but leaves a sleeper holding stdout.
        let start = Instant::now();
        let output = ProcessBuilder::new("sh")
            .args(["-c", "sleep 4 & echo ready"])
            .timeout(Duration::from_millis(300))
            .exec()
            .unwrap();

        assert!(!output.timed_out);
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout.trim(), "ready");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_spawn_failure_is_error() {
        let result = ProcessBuilder::new("quay-definitely-not-a-real-program").exec();
        assert!(result.is_err());
    }
}
