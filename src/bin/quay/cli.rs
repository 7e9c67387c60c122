//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use quay::pipeline::Debugger;

/// Quay - build-matrix orchestration and smoke validation for native apps
#[derive(Parser)]
#[command(name = "quay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Native project directory (defaults to the nearest directory with Quay.toml)
    #[arg(long, global = true, env = "QUAY_PROJECT")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build matrix and smoke test every leg
    Run(RunArgs),

    /// Show the commands each leg would run, without running them
    Plan(PlanArgs),

    /// Print the generated smoke test script
    Smoke(SmokeArgs),

    /// Inspect a built binary
    Inspect(InspectArgs),

    /// Show the toolchain each leg requires
    Toolchain(ToolchainArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Which legs to act on.
#[derive(Args)]
pub struct LegArgs {
    /// Legs to run, e.g. `linux-clang` (defaults to legs native to this host)
    #[arg(long = "leg", value_name = "LEG")]
    pub legs: Vec<String>,

    /// Run the full configured matrix
    #[arg(long, conflicts_with = "legs")]
    pub all: bool,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub legs: LegArgs,

    /// Skip package installation; tools must already be on PATH
    #[arg(long)]
    pub no_provision: bool,

    /// Build in release mode
    #[arg(short, long)]
    pub release: bool,

    /// Number of parallel build jobs per leg
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Maximum number of legs to run at once
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Output format: human, json, github
    #[arg(long, default_value = "human")]
    pub output_format: String,

    /// Run the smoke test under a debugger
    #[arg(long, value_enum)]
    pub debugger: Option<Debugger>,

    /// URL the smoke test loads
    #[arg(long)]
    pub url: Option<String>,

    /// Status the backend must report for the smoke test to pass
    #[arg(long)]
    pub sentinel: Option<String>,

    /// Serve this directory on 127.0.0.1 and smoke test a page from it
    #[arg(long, value_name = "DIR", conflicts_with = "url")]
    pub serve: Option<PathBuf>,

    /// Page under --serve the smoke test loads (default: index.html)
    #[arg(long, requires = "serve")]
    pub page: Option<String>,

    /// Backend script under src/engine/ to deliver next to the binary
    #[arg(long)]
    pub backend: Option<String>,

    /// Legacy test suite to run after a passing smoke test
    #[arg(long)]
    pub legacy_script: Option<PathBuf>,

    /// Per-step timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Smoke test timeout in seconds
    #[arg(long)]
    pub smoke_timeout: Option<u64>,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub legs: LegArgs,

    /// Plan without package installation
    #[arg(long)]
    pub no_provision: bool,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SmokeArgs {
    /// URL the smoke test loads
    #[arg(long)]
    pub url: Option<String>,

    /// Status the backend must report for the smoke test to pass
    #[arg(long)]
    pub sentinel: Option<String>,

    /// Write the script into this directory instead of printing it
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print only the script's SHA-256 digest
    #[arg(long)]
    pub digest: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Binary to inspect
    pub path: PathBuf,

    /// Platform the binary was built for (defaults to the host)
    #[arg(long)]
    pub platform: Option<String>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ToolchainArgs {
    #[command(flatten)]
    pub legs: LegArgs,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
