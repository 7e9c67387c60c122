//! Native build invocation.

use std::path::Path;

use crate::core::artifact::BuildArtifact;
use crate::core::env::LegEnv;
use crate::core::error::{Step, StepError};
use crate::core::toolchain::ResolvedToolchain;
use crate::pipeline::context::{failure_message, LegContext};
use crate::util::process::ProcessBuilder;

/// `<driver> -j<jobs>` run in the output directory.
pub fn build_command(driver: &Path, out: &Path, jobs: usize) -> ProcessBuilder {
    ProcessBuilder::new(driver)
        .arg(format!("-j{}", jobs.max(1)))
        .cwd(out)
}

/// Build the configured tree and describe the expected artifact.
///
/// Whether the artifact actually exists is left to inspection.
pub fn build(
    ctx: &LegContext<'_>,
    env: &LegEnv,
    tools: &ResolvedToolchain,
    out: &Path,
) -> Result<BuildArtifact, StepError> {
    let cmd = build_command(&tools.driver, out, ctx.settings.jobs);
    let display = cmd.display_command();

    tracing::info!("[{}] Building with {} jobs", ctx.leg.id(), ctx.settings.jobs);

    let output = ctx.exec(Step::Build, env, cmd, ctx.settings.timeouts.step)?;
    if !output.success() {
        return Err(StepError::Build {
            message: failure_message(&display, &output),
        });
    }

    Ok(BuildArtifact::locate(
        out,
        &ctx.settings.binary_name,
        ctx.leg.platform,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leg::{CompilerFamily, MatrixLeg, Platform};
    use crate::pipeline::provision::toolchain_spec;
    use crate::test_support::{
        test_settings, FakeToolchain, MockExecutor, MockProcessOutput, ProjectFixture,
    };

    #[test]
    fn test_build_command() {
        let cmd = build_command(Path::new("mingw32-make"), Path::new("/out"), 8);
        assert_eq!(cmd.display_command(), "mingw32-make -j8");
        assert_eq!(cmd.get_cwd(), Some(Path::new("/out")));

        let cmd = build_command(Path::new("make"), Path::new("/out"), 0);
        assert_eq!(cmd.display_command(), "make -j1");
    }

    #[test]
    fn test_build_locates_artifact() {
        let leg = MatrixLeg::new(Platform::Windows, CompilerFamily::Gcc);
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let settings = test_settings(&project, &tools);
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let exec = MockExecutor::new();
        exec.expect("mingw32-make -j2", MockProcessOutput::success(""));
        let ctx = LegContext::new(&leg, &settings, &exec);
        let out = settings.output_dir(&leg);

        let artifact = build(&ctx, &tools.env(), &resolved, &out).unwrap();
        assert_eq!(artifact.path, out.join("bin").join("app.exe"));
        assert!(!artifact.exists);
    }

    #[test]
    fn test_build_failure() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let settings = test_settings(&project, &tools);
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let exec = MockExecutor::new();
        exec.expect("make -j2", MockProcessOutput::failure(2, "ld: undefined reference"));
        let ctx = LegContext::new(&leg, &settings, &exec);

        let err = build(&ctx, &tools.env(), &resolved, &settings.output_dir(&leg)).unwrap_err();
        assert_eq!(err.step(), Step::Build);
        assert!(err.to_string().contains("exit code 2"));
    }
}
