//! Backend substitution.
//!
//! The runtime backend is whatever script sits next to the binary, so
//! swapping automation engines only means copying a different script and
//! installing its package. The native build is not involved.

use std::path::{Path, PathBuf};

use crate::core::artifact::BackendBundle;
use crate::core::env::LegEnv;
use crate::core::error::{Step, StepError};
use crate::core::toolchain::ResolvedToolchain;
use crate::pipeline::context::{failure_message, LegContext};
use crate::util::fs::{copy_file, glob_file_names};
use crate::util::process::ProcessBuilder;

/// Directory holding backend scripts in the project tree.
pub fn engine_dir(project_root: &Path) -> PathBuf {
    project_root.join("src").join("engine")
}

/// `<npm> install <package>`, local to the output directory.
pub fn install_command(package_manager: &Path, package: &str, out: &Path) -> ProcessBuilder {
    ProcessBuilder::new(package_manager)
        .arg("install")
        .arg(package)
        .cwd(out)
}

/// Copy the backend script next to the binary and install its package.
pub fn substitute(
    ctx: &LegContext<'_>,
    env: &LegEnv,
    tools: &ResolvedToolchain,
    out: &Path,
) -> Result<BackendBundle, StepError> {
    let settings = ctx.settings;
    let engines = engine_dir(ctx.project_root());
    let source = engines.join(&settings.backend_script);

    if !source.is_file() {
        return Err(StepError::MissingBackendScript {
            path: source,
            available: glob_file_names(&engines, "*.js").unwrap_or_default(),
        });
    }

    let script_path = out.join(&settings.backend_script);
    copy_file(&source, &script_path)
        .map_err(|e| StepError::failed(Step::BackendSubstitution, format!("{:#}", e)))?;
    tracing::info!(
        "[{}] Backend {} -> {}",
        ctx.leg.id(),
        settings.backend_script,
        script_path.display()
    );

    let cmd = install_command(&tools.script_package_manager, &settings.backend_package, out);
    let display = cmd.display_command();
    let output = ctx.exec(Step::BackendSubstitution, env, cmd, settings.timeouts.step)?;
    if !output.success() {
        return Err(StepError::Substitution {
            message: failure_message(&display, &output),
        });
    }

    Ok(BackendBundle {
        script_path,
        dependency: settings.backend_package.clone(),
        installed: true,
    })
}
