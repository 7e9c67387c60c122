//! Quay CLI - build-matrix orchestration and smoke validation

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use quay::util::GlobalContext;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("quay=debug")
    } else {
        EnvFilter::new("quay=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    let context = || -> Result<GlobalContext> {
        let mut ctx = match cli.project {
            Some(ref path) => GlobalContext::with_project(path)?,
            None => GlobalContext::new()?,
        };
        ctx.set_verbose(cli.verbose);
        ctx.set_color(!cli.no_color);
        Ok(ctx)
    };

    // Execute command
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &context()?),
        Commands::Plan(args) => commands::plan::execute(args, &context()?),
        Commands::Smoke(args) => commands::smoke::execute(args, &context()?),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Toolchain(args) => commands::toolchain::execute(args, &context()?),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
