//! `quay run` command

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::RunArgs;
use quay::ops::{format_report_for_output, OutputFormat, Orchestrator};
use quay::pipeline::Settings;
use quay::util::diagnostic::{emit, suggestions, Diagnostic};
use quay::util::{GlobalContext, SystemRunner};

pub fn execute(args: RunArgs, ctx: &GlobalContext) -> Result<()> {
    let output_format: OutputFormat = args
        .output_format
        .parse()
        .with_context(|| format!("invalid output format: {}", args.output_format))?;

    let config = ctx.load_config()?;
    let legs = super::legs(&config, &args.legs)?;

    let mut settings = Settings::from_config(&config, ctx.project_root());
    settings.no_provision = args.no_provision;
    settings.release |= args.release;
    settings.debugger = args.debugger;
    if let Some(jobs) = args.jobs {
        settings.jobs = jobs.max(1);
    }
    if let Some(url) = args.url {
        // An explicit URL wins over a configured fixture directory.
        settings.smoke_url = url;
        settings.serve_dir = None;
    }
    if let Some(sentinel) = args.sentinel {
        settings.sentinel = sentinel;
    }
    if let Some(dir) = args.serve {
        settings.serve_dir = Some(dir);
    }
    if let Some(page) = args.page {
        settings.smoke_page = page;
    }
    if let Some(backend) = args.backend {
        settings.backend_script = backend;
    }
    if let Some(script) = args.legacy_script {
        settings.legacy_script = Some(script);
    }
    if let Some(secs) = args.timeout {
        settings.timeouts.step = Duration::from_secs(secs);
    }
    if let Some(secs) = args.smoke_timeout {
        settings.timeouts.smoke = Duration::from_secs(secs);
    }

    tracing::info!(
        "Running {} leg{} in {}",
        legs.len(),
        if legs.len() == 1 { "" } else { "s" },
        ctx.project_root().display()
    );

    // Progress bars would interleave with machine-readable output.
    let progress = output_format == OutputFormat::Human && !ctx.is_verbose();
    let mut orchestrator =
        Orchestrator::new(settings, Arc::new(SystemRunner))?.with_progress(progress);
    if let Some(n) = args.parallel {
        orchestrator = orchestrator.with_parallelism(n);
    }

    tracing::debug!(
        "Smoke script for {} sha256:{}",
        orchestrator.smoke_script().url,
        orchestrator.smoke_script().digest
    );

    let report = orchestrator.run(&legs)?;
    print!(
        "{}",
        format_report_for_output(&report, output_format, ctx.is_verbose())
    );

    if !report.passed {
        if output_format == OutputFormat::Human {
            let diag = Diagnostic::error(format!(
                "{} of {} legs failed",
                report.failed_count(),
                report.verdicts.len()
            ));
            let diag = if ctx.is_verbose() {
                diag
            } else {
                diag.with_suggestion(suggestions::VERBOSE)
            };
            emit(&diag, ctx.color());
        }
        std::process::exit(1);
    }

    Ok(())
}
