//! Toolchain provisioning.
//!
//! Installs a leg's package set from its package source and resolves every
//! required executable on the leg's own search path. The host environment
//! is never touched: the leg's `LegEnv` goes in by value and comes back out
//! with the search path extended and the provisioned flag set.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::env::LegEnv;
use crate::core::error::{Step, StepError};
use crate::core::leg::{MatrixLeg, PackageSource};
use crate::core::toolchain::{ResolvedToolchain, Tool, ToolchainSpec};
use crate::pipeline::context::{failure_message, LegContext, Settings};
use crate::util::process::{ProcessBuilder, ProcessOutput};

static APT_MISSING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^E: (?:Unable to locate package\s+|Package\s+'?)([^\s']+)").ok());

static PACMAN_MISSING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^error: target not found: (\S+)").ok());

/// Package manager executable for a source.
pub fn package_manager(source: PackageSource) -> &'static str {
    match source {
        PackageSource::System => "apt-get",
        PackageSource::Msys => "pacman",
    }
}

/// The toolchain a leg needs under the current settings.
pub fn toolchain_spec(leg: &MatrixLeg, settings: &Settings) -> ToolchainSpec {
    ToolchainSpec::for_leg(
        leg,
        settings.generator_for(leg),
        settings.package_overrides(leg.package_source),
    )
}

/// Extend the search path with the package source's binary directories.
///
/// MSYS legs get `<root>/mingw64/bin` ahead of `<root>/usr/bin`; system legs
/// are left unchanged.
pub fn leg_search_path(leg: &MatrixLeg, settings: &Settings, env: LegEnv) -> LegEnv {
    match leg.package_source {
        PackageSource::System => env,
        PackageSource::Msys => env
            .with_prepended_path(settings.msys_root.join("usr").join("bin"))
            .with_prepended_path(settings.msys_root.join("mingw64").join("bin")),
    }
}

/// The install command for a spec, given the package manager (and sudo)
/// to invoke.
pub fn install_command(
    source: PackageSource,
    manager: &Path,
    sudo: Option<&Path>,
    spec: &ToolchainSpec,
) -> ProcessBuilder {
    let cmd = match (source, sudo) {
        (PackageSource::System, Some(sudo)) => ProcessBuilder::new(sudo).arg(manager),
        _ => ProcessBuilder::new(manager),
    };
    let cmd = match source {
        PackageSource::System => cmd.args(["install", "-y", "--no-install-recommends"]),
        PackageSource::Msys => cmd.args(["-S", "--needed", "--noconfirm"]),
    };
    cmd.args(&spec.packages)
}

/// Provision the toolchain for one leg.
///
/// Fails with [`StepError::AlreadyProvisioned`], without running anything,
/// when `env` has already been through here.
pub fn provision(
    ctx: &LegContext<'_>,
    env: LegEnv,
) -> Result<(LegEnv, ResolvedToolchain), StepError> {
    if env.is_provisioned() {
        return Err(StepError::AlreadyProvisioned);
    }

    let leg = ctx.leg;
    let settings = ctx.settings;
    let env = leg_search_path(leg, settings, env);
    let spec = toolchain_spec(leg, settings);

    if settings.no_provision {
        tracing::info!("[{}] Skipping package installation", leg.id());
    } else {
        install(ctx, &env, &spec)?;
    }

    let tools = resolve_tools(&spec, &env)?;
    tracing::debug!("[{}] Toolchain resolved: {:?}", leg.id(), tools);

    Ok((env.mark_provisioned(), tools))
}

fn install(ctx: &LegContext<'_>, env: &LegEnv, spec: &ToolchainSpec) -> Result<(), StepError> {
    let source = ctx.leg.package_source;
    let manager_name = package_manager(source);
    let manager = env
        .resolve(manager_name)
        .ok_or_else(|| StepError::ToolNotFound {
            role: "package manager",
            tool: manager_name.to_string(),
        })?;

    let sudo = if ctx.settings.sudo && source == PackageSource::System {
        Some(env.resolve("sudo").ok_or_else(|| StepError::ToolNotFound {
            role: "privilege helper",
            tool: "sudo".to_string(),
        })?)
    } else {
        None
    };

    tracing::info!(
        "[{}] Installing {} packages from {}",
        ctx.leg.id(),
        spec.packages.len(),
        source
    );

    let cmd = install_command(source, &manager, sudo.as_deref(), spec)
        .env("DEBIAN_FRONTEND", "noninteractive");
    let display = cmd.display_command();
    let output = ctx.exec(Step::Provision, env, cmd, ctx.settings.timeouts.step)?;

    if !output.success() {
        let missing = missing_packages(source, &output);
        return Err(StepError::PackagesUnavailable {
            packages: if missing.is_empty() {
                spec.packages.clone()
            } else {
                missing
            },
            origin: source,
            message: failure_message(&display, &output),
        });
    }

    Ok(())
}

/// Packages the package manager reported as unknown.
fn missing_packages(source: PackageSource, output: &ProcessOutput) -> Vec<String> {
    let re = match source {
        PackageSource::System => APT_MISSING.as_ref(),
        PackageSource::Msys => PACMAN_MISSING.as_ref(),
    };
    let Some(re) = re else {
        return Vec::new();
    };

    let mut missing: Vec<String> = Vec::new();
    for text in [&output.stderr, &output.stdout] {
        for caps in re.captures_iter(text) {
            let name = caps[1].to_string();
            if !missing.contains(&name) {
                missing.push(name);
            }
        }
    }
    missing
}

/// Resolve every tool of `spec` on the leg search path.
pub fn resolve_tools(spec: &ToolchainSpec, env: &LegEnv) -> Result<ResolvedToolchain, StepError> {
    let find = |tool: Tool| -> Result<PathBuf, StepError> {
        let name = spec.tool(tool).unwrap_or_default();
        env.resolve(name).ok_or_else(|| StepError::ToolNotFound {
            role: tool.label(),
            tool: name.to_string(),
        })
    };

    Ok(ResolvedToolchain {
        cc: find(Tool::Cc)?,
        cxx: find(Tool::Cxx)?,
        generator: find(Tool::Generator)?,
        driver: find(Tool::Driver)?,
        interpreter: find(Tool::Interpreter)?,
        script_runtime: find(Tool::ScriptRuntime)?,
        script_package_manager: find(Tool::ScriptPackageManager)?,
    })
}
