//! Output formatting for matrix reports (human/JSON/GitHub).

use crate::core::verdict::{LegVerdict, MatrixReport};

/// Output format for `quay run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// GitHub Actions annotations with job summary
    Github,
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "github" | "github-actions" | "gha" => Ok(OutputFormat::Github),
            _ => Err(OutputFormatParseError(s.to_string())),
        }
    }
}

/// Error parsing output format option.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid output format '{0}', valid values: human, json, github")]
pub struct OutputFormatParseError(pub String);

fn mark(passed: bool) -> &'static str {
    if passed {
        "[OK]"
    } else {
        "[FAIL]"
    }
}

fn tri(result: Option<bool>) -> &'static str {
    match result {
        Some(true) => "pass",
        Some(false) => "fail",
        None => "-",
    }
}

/// Format one leg for a terminal.
pub fn format_verdict(verdict: &LegVerdict, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {} ({:.2?})\n",
        mark(verdict.passed),
        verdict.leg,
        verdict.total_duration
    ));

    for step in &verdict.steps {
        output.push_str(&format!(
            "    {} {} ({:.2?})\n",
            mark(step.passed),
            step.step,
            step.duration
        ));
        if verbose || !step.passed {
            for line in step.message.lines() {
                output.push_str(&format!("        {}\n", line));
            }
        }
        for warning in &step.warnings {
            output.push_str(&format!("        Warning: {}\n", warning));
        }
    }

    for suggestion in &verdict.suggestions {
        output.push_str(&format!("    help: {}\n", suggestion));
    }

    if let Some(ref smoke) = verdict.smoke {
        if let Some(ref title) = smoke.title {
            output.push_str(&format!("    Page title: {}\n", title));
        }
    }
    if verbose {
        if let Some(ref digest) = verdict.smoke_digest {
            output.push_str(&format!("    Smoke script: sha256:{}\n", digest));
        }
    }

    output
}

/// Format a whole report for a terminal.
pub fn format_report(report: &MatrixReport, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Matrix: {} leg{}\n",
        report.verdicts.len(),
        if report.verdicts.len() == 1 { "" } else { "s" }
    ));
    output.push_str(&format!("{}\n\n", "=".repeat(50)));

    for verdict in &report.verdicts {
        output.push_str(&format_verdict(verdict, verbose));
        output.push('\n');
    }

    output.push_str(&format!(
        "{:<20} {:<10} {:<10} {:<10} {:<10}\n",
        "LEG", "CONFIGURE", "BUILD", "SMOKE", "LEGACY"
    ));
    for verdict in &report.verdicts {
        output.push_str(&format!(
            "{:<20} {:<10} {:<10} {:<10} {:<10}\n",
            verdict.leg_id,
            tri(verdict.configure_result()),
            tri(verdict.build_result()),
            tri(verdict.smoke_test_result()),
            tri(verdict.legacy_test_result()),
        ));
    }
    output.push('\n');

    let status = if report.passed { "PASSED" } else { "FAILED" };
    output.push_str(&format!(
        "Result: {} ({}/{} legs passed)\n",
        status,
        report.passed_count(),
        report.verdicts.len()
    ));
    output.push_str(&format!("Total time: {:.2?}\n", report.total_duration));

    output
}

/// Format a report as JSON.
pub fn format_report_json(report: &MatrixReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize report: {}"}}"#, e))
}

/// Escape a message for a workflow command.
fn escape_annotation(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "")
        .replace('\n', "%0A")
}

/// Format a report for GitHub Actions.
///
/// Outputs:
/// - `::error::` and `::warning::` annotations per leg
/// - Job summary in markdown format
pub fn format_report_github_actions(report: &MatrixReport) -> String {
    let mut output = String::new();

    for verdict in &report.verdicts {
        for step in &verdict.steps {
            if !step.passed && step.warnings.is_empty() {
                output.push_str(&format!(
                    "::error title={} {}::{}\n",
                    verdict.leg_id,
                    step.step,
                    escape_annotation(&step.message)
                ));
            }
            for warning in &step.warnings {
                output.push_str(&format!(
                    "::warning title={} {}::{}\n",
                    verdict.leg_id,
                    step.step,
                    escape_annotation(warning)
                ));
            }
        }
    }

    output.push_str("::group::Matrix Summary\n\n");
    output.push_str("| Leg | Configure | Build | Smoke | Legacy | Duration |\n");
    output.push_str("|-----|-----------|-------|-------|--------|----------|\n");
    let cell = |result: Option<bool>| match result {
        Some(true) => ":white_check_mark:",
        Some(false) => ":x:",
        None => ":heavy_minus_sign:",
    };
    for verdict in &report.verdicts {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} | {:.2?} |\n",
            verdict.leg_id,
            cell(verdict.configure_result()),
            cell(verdict.build_result()),
            cell(verdict.smoke_test_result()),
            cell(verdict.legacy_test_result()),
            verdict.total_duration
        ));
    }
    output.push('\n');

    let (emoji, status) = if report.passed {
        (":heavy_check_mark:", "PASSED")
    } else {
        (":x:", "FAILED")
    };
    output.push_str(&format!(
        "**Result:** {} {} ({}/{} legs passed)\n",
        emoji,
        status,
        report.passed_count(),
        report.verdicts.len()
    ));
    output.push_str(&format!("**Total time:** {:.2?}\n", report.total_duration));

    let failed: Vec<_> = report.verdicts.iter().filter(|v| !v.passed).collect();
    if !failed.is_empty() {
        output.push_str("\n### Failed Legs\n");
        for verdict in failed {
            output.push_str("\n<details>\n");
            output.push_str(&format!(
                "<summary>{} ({})</summary>\n\n",
                verdict.leg_id,
                verdict
                    .error_kind
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "failed".to_string())
            ));
            output.push_str("```\n");
            output.push_str(verdict.error.as_deref().unwrap_or("no error recorded"));
            output.push_str("\n```\n\n</details>\n");
        }
    }

    output.push_str("::endgroup::\n");
    output
}

/// Format the report according to the specified output format.
pub fn format_report_for_output(
    report: &MatrixReport,
    format: OutputFormat,
    verbose: bool,
) -> String {
    match format {
        OutputFormat::Human => format_report(report, verbose),
        OutputFormat::Json => format_report_json(report),
        OutputFormat::Github => format_report_github_actions(report),
    }
}
