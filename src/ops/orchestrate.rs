//! Matrix orchestration: leg selection and the per-leg state machine.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::core::artifact::SmokeScript;
use crate::core::error::{Step, StepError};
use crate::core::leg::{self, MatrixLeg};
use crate::core::verdict::{LegState, LegVerdict, MatrixReport, SmokeOutcome, StepRecord};
use crate::ops::serve::FixtureServer;
use crate::pipeline::context::{LegContext, Settings};
use crate::pipeline::{build, configure, inspect, provision, runner, smoke, substitute};
use crate::util::config::Config;
use crate::util::fs::display_relative;
use crate::util::process::CommandRunner;

/// Which legs of the matrix to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegSelection {
    /// Legs native to the host platform.
    Host,
    /// The full configured matrix.
    All,
    /// Explicit leg ids, e.g. `linux-gcc`.
    Explicit(Vec<String>),
}

/// Resolve a selection against the configured matrix.
pub fn select_legs(config: &Config, selection: &LegSelection) -> Result<Vec<MatrixLeg>> {
    let matrix = leg::enumerate(&config.platforms(), &config.compilers());
    let known = || {
        matrix
            .iter()
            .map(|l| l.id())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let legs = match selection {
        LegSelection::All => matrix.clone(),
        LegSelection::Host => {
            let legs: Vec<MatrixLeg> = matrix.iter().filter(|l| l.runs_on_host()).cloned().collect();
            if legs.is_empty() {
                bail!(
                    "no matrix legs run on this host ({}); select legs with --leg or --all (known legs: {})",
                    std::env::consts::OS,
                    known()
                );
            }
            legs
        }
        LegSelection::Explicit(ids) => {
            let mut legs: Vec<MatrixLeg> = Vec::new();
            for id in ids {
                let parsed: MatrixLeg = id
                    .parse()
                    .with_context(|| format!("unknown leg `{}` (known legs: {})", id, known()))?;
                if !matrix.contains(&parsed) {
                    bail!("unknown leg `{}` (known legs: {})", id, known());
                }
                if !legs.contains(&parsed) {
                    legs.push(parsed);
                }
            }
            legs
        }
    };

    for leg in legs.iter().filter(|l| !l.runs_on_host()) {
        tracing::warn!("Leg {} does not target this host platform", leg.id());
    }

    Ok(legs)
}

/// Runs legs through the pipeline and collects their verdicts.
pub struct Orchestrator {
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    smoke: SmokeScript,
    server: Option<FixtureServer>,
    parallelism: Option<usize>,
    progress: bool,
}

impl Orchestrator {
    /// Create an orchestrator; fails when the smoke URL or sentinel is
    /// unusable, before any leg starts.
    ///
    /// With a fixture directory configured, its pages are served on loopback
    /// for as long as the orchestrator lives and the smoke test loads the
    /// configured page from there.
    pub fn new(settings: Settings, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let server = match settings.serve_dir {
            Some(ref dir) => Some(FixtureServer::start(dir)?),
            None => None,
        };
        let url = match server {
            Some(ref server) => server.url(&settings.smoke_page),
            None => settings.smoke_url.clone(),
        };
        let smoke = smoke::generate(&url, &settings.sentinel)?;
        Ok(Orchestrator {
            settings,
            runner,
            smoke,
            server,
            parallelism: None,
            progress: false,
        })
    }

    /// Run at most `n` legs at once (default: all of them).
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = Some(n.max(1));
        self
    }

    /// Show a progress bar while legs run.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The smoke script every leg runs.
    pub fn smoke_script(&self) -> &SmokeScript {
        &self.smoke
    }

    /// The fixture server, when one is running.
    pub fn fixture_server(&self) -> Option<&FixtureServer> {
        self.server.as_ref()
    }

    /// Run every leg and collect a report, in the order given.
    pub fn run(&self, legs: &[MatrixLeg]) -> Result<MatrixReport> {
        let start = Instant::now();
        let width = self.parallelism.unwrap_or(legs.len()).clamp(1, legs.len().max(1));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("quay-leg-{}", i))
            .build()
            .context("failed to start leg thread pool")?;

        let pb = self.progress_bar(legs.len());

        let verdicts: Vec<LegVerdict> = pool.install(|| {
            legs.par_iter()
                .map(|leg| {
                    let verdict = self.run_leg_isolated(leg);
                    if let Some(ref pb) = pb {
                        pb.inc(1);
                        pb.set_message(format!(
                            "{} {}",
                            verdict.leg_id,
                            if verdict.passed { "passed" } else { "failed" }
                        ));
                    }
                    verdict
                })
                .collect()
        });

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        Ok(MatrixReport::new(verdicts, start.elapsed()))
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.progress || total == 0 {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    /// Run one leg, turning a panic into a failed verdict so other legs are
    /// unaffected.
    fn run_leg_isolated(&self, leg: &MatrixLeg) -> LegVerdict {
        match catch_unwind(AssertUnwindSafe(|| self.run_leg(leg))) {
            Ok(verdict) => verdict,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("[{}] Leg panicked: {}", leg.id(), message);

                let mut verdict = LegVerdict::new(leg);
                verdict.error = Some(format!("internal error: {}", message));
                verdict.finish(Duration::ZERO);
                verdict
            }
        }
    }

    /// Drive one leg from `Pending` to `Done`.
    pub fn run_leg(&self, leg: &MatrixLeg) -> LegVerdict {
        let span = tracing::info_span!("leg", id = %leg.id());
        let _guard = span.enter();

        let start = Instant::now();
        let ctx = LegContext::new(leg, &self.settings, self.runner.as_ref());
        let mut verdict = LegVerdict::new(leg);

        match self.drive(&ctx, &mut verdict) {
            Ok(()) => tracing::info!("[{}] Passed", leg.id()),
            Err(err) => tracing::error!("[{}] {}", leg.id(), err),
        }

        verdict.finish(start.elapsed());
        verdict
    }

    fn drive(&self, ctx: &LegContext<'_>, verdict: &mut LegVerdict) -> Result<(), StepError> {
        let root = ctx.project_root();

        let (env, tools) = timed(verdict, Step::Provision, || {
            let (env, tools) = provision::provision(ctx, self.settings.base_env.clone())?;
            let message = if self.settings.no_provision {
                "resolved toolchain (installation skipped)".to_string()
            } else {
                format!("installed toolchain from {}", ctx.leg.package_source)
            };
            Ok(((env, tools), message))
        })?;
        verdict.advance(LegState::Provisioned);

        let out = timed(verdict, Step::Configure, || {
            let out = configure::configure(ctx, &env, &tools)?;
            let message = format!("configured {}", display_relative(root, &out));
            Ok((out, message))
        })?;
        verdict.advance(LegState::Configured);

        let artifact = timed(verdict, Step::Build, || {
            let artifact = build::build(ctx, &env, &tools, &out)?;
            let message = format!("built {}", display_relative(root, &artifact.path));
            Ok((artifact, message))
        })?;
        verdict.advance(LegState::Built);

        let started = Instant::now();
        let report = inspect::inspect(&artifact, ctx.leg.platform, &out);
        let mut record = if report.is_ok() {
            StepRecord::pass(
                Step::Inspect,
                format!("{} executable", report.expected_format),
                started.elapsed(),
            )
        } else {
            StepRecord::fail(Step::Inspect, report.problems.join("; "), started.elapsed())
        };
        for problem in &report.problems {
            tracing::warn!("[{}] Inspection: {}", ctx.leg.id(), problem);
            record = record.with_warning(problem.clone());
        }
        verdict.record(record);
        let artifact = artifact.with_inspection(report);
        verdict.artifact = Some(artifact.clone());

        timed(verdict, Step::BackendSubstitution, || {
            let bundle = substitute::substitute(ctx, &env, &tools, &out)?;
            let message = format!(
                "{} installed next to {}",
                bundle.dependency,
                display_relative(root, &bundle.script_path)
            );
            Ok(((), message))
        })?;
        verdict.advance(LegState::BackendReady);

        let script = match smoke::write(&self.smoke, &out) {
            Ok(script) => script,
            Err(err) => {
                verdict.smoke = Some(failed_smoke(&err));
                verdict.fail(&err, Duration::ZERO);
                return Err(err);
            }
        };
        verdict.smoke_digest = Some(script.digest.clone());
        let smoke_started = Instant::now();
        let outcome = runner::run_smoke(ctx, &env, &artifact, &script, &out);
        match outcome {
            Ok(outcome) => {
                verdict.record(StepRecord::pass(
                    Step::SmokeTest,
                    format!(
                        "status `{}`, title `{}`",
                        outcome.status.as_deref().unwrap_or_default(),
                        outcome.title.as_deref().unwrap_or_default()
                    ),
                    smoke_started.elapsed(),
                ));
                verdict.smoke = Some(outcome);
            }
            Err(err) => {
                verdict.smoke = Some(failed_smoke(&err));
                verdict.fail(&err, smoke_started.elapsed());
                return Err(err);
            }
        }
        verdict.advance(LegState::SmokeTested);

        let legacy_started = Instant::now();
        if let Some(outcome) = runner::run_legacy(ctx, &env, &tools, &artifact) {
            let record = match &outcome.failure {
                None => StepRecord::pass(Step::LegacyTest, "passed", legacy_started.elapsed()),
                Some(failure) => StepRecord::fail(
                    Step::LegacyTest,
                    failure.to_string(),
                    legacy_started.elapsed(),
                )
                .with_warning(format!("legacy suite failed (not fatal): {}", failure)),
            };
            verdict.record(record);
            verdict.legacy = Some(outcome);
        }

        Ok(())
    }
}

/// Smoke outcome for a smoke step that failed with `err`.
///
/// Timeouts and spawn failures carry no exit code or status.
fn failed_smoke(err: &StepError) -> SmokeOutcome {
    let (exit_code, status) = match err {
        StepError::SmokeTest {
            status, exit_code, ..
        } => (*exit_code, status.clone()),
        _ => (None, None),
    };
    SmokeOutcome {
        exit_code,
        status,
        title: None,
        passed: false,
    }
}

/// Run a fatal step, recording its outcome on the verdict.
fn timed<T>(
    verdict: &mut LegVerdict,
    step: Step,
    f: impl FnOnce() -> Result<(T, String), StepError>,
) -> Result<T, StepError> {
    let started = Instant::now();
    match f() {
        Ok((value, message)) => {
            verdict.record(StepRecord::pass(step, message, started.elapsed()));
            Ok(value)
        }
        Err(err) => {
            verdict.fail(&err, started.elapsed());
            Err(err)
        }
    }
}
