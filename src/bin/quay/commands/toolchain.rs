//! `quay toolchain` command

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;

use crate::cli::ToolchainArgs;
use quay::core::LegEnv;
use quay::pipeline::provision::{leg_search_path, package_manager, toolchain_spec};
use quay::pipeline::Settings;
use quay::util::{GlobalContext, ProcessBuilder};

static VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(\d+\.\d+(?:\.\d+)?)\b").ok());

pub fn execute(args: ToolchainArgs, ctx: &GlobalContext) -> Result<()> {
    let config = ctx.load_config()?;
    let legs = super::legs(&config, &args.legs)?;
    let settings = Settings::from_config(&config, ctx.project_root());

    for leg in &legs {
        let spec = toolchain_spec(leg, &settings);
        let env = leg_search_path(leg, &settings, settings.base_env.clone());

        println!("{}", leg);
        println!("  Generator: {}", spec.generator);
        println!(
            "  Packages ({}): {}",
            package_manager(leg.package_source),
            spec.packages.join(" ")
        );
        println!("  Tools:");
        for (tool, name) in &spec.tools {
            match env.resolve(name) {
                Some(path) => {
                    let version = version_of(&env, &path)
                        .map(|v| format!(" ({})", v))
                        .unwrap_or_default();
                    println!("    {:<22} {}{}", tool.label(), path.display(), version);
                }
                None => println!("    {:<22} {} not found", tool.label(), name),
            }
        }
        println!();
    }

    Ok(())
}

/// First version number in a tool's `--version` banner.
fn version_of(env: &LegEnv, program: &std::path::Path) -> Option<String> {
    let cmd = env.apply(
        ProcessBuilder::new(program)
            .arg("--version")
            .timeout(Duration::from_secs(5)),
    );
    let output = cmd.exec().ok()?;
    let banner = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let re = VERSION.as_ref()?;
    re.captures(banner.lines().next()?)
        .map(|caps| caps[1].to_string())
}
