//! Runs the built binary against the smoke script and the legacy suite.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::artifact::{BuildArtifact, SmokeScript};
use crate::core::env::LegEnv;
use crate::core::error::{LegacyTestFailure, Step, StepError};
use crate::core::toolchain::ResolvedToolchain;
use crate::core::verdict::{LegacyOutcome, SmokeOutcome};
use crate::pipeline::context::LegContext;
use crate::pipeline::smoke::SCRIPT_NAME;
use crate::util::process::{ProcessBuilder, ProcessOutput};

/// Debugger the smoke run can be wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Debugger {
    Gdb,
    Lldb,
    Valgrind,
}

impl Debugger {
    /// Wrap `program` so it runs under this debugger non-interactively.
    pub fn wrap(&self, program: &Path) -> ProcessBuilder {
        match self {
            Debugger::Gdb => ProcessBuilder::new("gdb")
                .args(["-batch", "-ex", "run", "-ex", "bt", "--args"])
                .arg(program),
            Debugger::Lldb => ProcessBuilder::new("lldb")
                .args(["--batch", "-o", "run", "-o", "bt", "--"])
                .arg(program),
            Debugger::Valgrind => ProcessBuilder::new("valgrind").arg(program),
        }
    }
}

impl fmt::Display for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Debugger::Gdb => "gdb",
            Debugger::Lldb => "lldb",
            Debugger::Valgrind => "valgrind",
        };
        f.write_str(s)
    }
}

/// `<artifact> smoke.js` in the output directory, optionally under a
/// debugger.
pub fn smoke_command(artifact: &Path, out: &Path, debugger: Option<Debugger>) -> ProcessBuilder {
    let cmd = match debugger {
        Some(debugger) => debugger.wrap(artifact),
        None => ProcessBuilder::new(artifact),
    };
    cmd.arg(SCRIPT_NAME).cwd(out)
}

/// Interpret a smoke run.
///
/// The first stdout line is the reported status and the second the page
/// title. Under a debugger, other output may come first, so the status is
/// taken from the first line equal to the sentinel when there is one.
pub fn parse_smoke_output(
    output: &ProcessOutput,
    sentinel: &str,
    debugger: Option<Debugger>,
) -> SmokeOutcome {
    let lines = output.stdout_lines();
    let start = match debugger {
        Some(_) => lines.iter().position(|l| *l == sentinel).unwrap_or(0),
        None => 0,
    };
    let status = lines.get(start).map(|s| s.to_string());
    let title = lines.get(start + 1).map(|s| s.to_string());

    let status_ok = status.as_deref() == Some(sentinel);
    let passed = output.code == Some(0) && status_ok;

    SmokeOutcome {
        exit_code: output.code,
        status,
        title,
        passed,
    }
}

/// Why a smoke outcome failed.
fn smoke_failure(outcome: &SmokeOutcome, sentinel: &str, output: &ProcessOutput) -> String {
    let status = outcome.status.as_deref().unwrap_or("<none>");
    let mut message = match (outcome.exit_code, status == sentinel) {
        (Some(0), false) => format!(
            "exit code 0 disagrees with reported status `{}` (expected `{}`)",
            status, sentinel
        ),
        (Some(code), true) => format!(
            "reported status `{}` but exited with code {}",
            status, code
        ),
        (Some(code), false) => format!("reported status `{}` (exit code {})", status, code),
        (None, _) => format!("terminated by signal after reporting status `{}`", status),
    };
    let stderr = output.stderr_tail(10);
    if !stderr.trim().is_empty() {
        message.push('\n');
        message.push_str(stderr.trim_end());
    }
    message
}

/// Run the artifact against the smoke script.
pub fn run_smoke(
    ctx: &LegContext<'_>,
    env: &LegEnv,
    artifact: &BuildArtifact,
    script: &SmokeScript,
    out: &Path,
) -> Result<SmokeOutcome, StepError> {
    let debugger = ctx.settings.debugger;
    let cmd = smoke_command(&artifact.path, out, debugger);

    tracing::info!(
        "[{}] Smoke test against {}{}",
        ctx.leg.id(),
        script.url,
        debugger.map(|d| format!(" under {}", d)).unwrap_or_default()
    );

    let output = ctx.exec(Step::SmokeTest, env, cmd, ctx.settings.timeouts.smoke)?;
    let outcome = parse_smoke_output(&output, &script.sentinel, debugger);

    if !outcome.passed {
        return Err(StepError::SmokeTest {
            status: outcome.status.clone(),
            exit_code: outcome.exit_code,
            message: smoke_failure(&outcome, &script.sentinel, &output),
        });
    }

    tracing::info!(
        "[{}] Smoke test passed: {} ({})",
        ctx.leg.id(),
        outcome.status.as_deref().unwrap_or_default(),
        outcome.title.as_deref().unwrap_or_default()
    );
    Ok(outcome)
}

/// `<interpreter> <script>` in the project root, with the artifact path
/// exported as `QUAY_ARTIFACT` and a fixed locale and timezone.
pub fn legacy_command(
    interpreter: &Path,
    project_root: &Path,
    script: &Path,
    artifact: &Path,
) -> ProcessBuilder {
    ProcessBuilder::new(interpreter)
        .arg(project_root.join(script))
        .cwd(project_root)
        .env("QUAY_ARTIFACT", artifact.to_string_lossy())
        .env("LANG", "C")
        .env("TZ", "CIST-12:45:00")
        .env_remove("LC_ALL")
}

/// Run the legacy test suite, if one is configured.
///
/// Nothing that happens here is fatal: spawn failures, timeouts, and
/// non-zero exits all become a [`LegacyTestFailure`] on the outcome.
pub fn run_legacy(
    ctx: &LegContext<'_>,
    env: &LegEnv,
    tools: &ResolvedToolchain,
    artifact: &BuildArtifact,
) -> Option<LegacyOutcome> {
    let script: PathBuf = ctx.settings.legacy_script.clone()?;
    let cmd = legacy_command(
        &tools.interpreter,
        ctx.project_root(),
        &script,
        &artifact.path,
    );

    tracing::info!("[{}] Running legacy suite {}", ctx.leg.id(), script.display());

    let outcome = match ctx.exec(Step::LegacyTest, env, cmd, ctx.settings.timeouts.legacy) {
        Ok(output) if output.success() => LegacyOutcome {
            exit_code: output.code,
            failure: None,
        },
        Ok(output) => LegacyOutcome {
            exit_code: output.code,
            failure: Some(LegacyTestFailure {
                exit_code: output.code,
                timed_out: false,
                message: summary_line(&output),
            }),
        },
        Err(err @ StepError::Timeout { .. }) => LegacyOutcome {
            exit_code: None,
            failure: Some(LegacyTestFailure {
                exit_code: None,
                timed_out: true,
                message: err.to_string(),
            }),
        },
        Err(err) => LegacyOutcome {
            exit_code: None,
            failure: Some(LegacyTestFailure {
                exit_code: None,
                timed_out: false,
                message: err.to_string(),
            }),
        },
    };

    if let Some(ref failure) = outcome.failure {
        tracing::warn!("[{}] {} (not fatal)", ctx.leg.id(), failure);
    }
    Some(outcome)
}

/// Last non-empty line of output, which is where test runners put their
/// totals.
fn summary_line(output: &ProcessOutput) -> String {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no output")
        .to_string()
}
