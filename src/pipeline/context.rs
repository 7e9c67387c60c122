//! Settings shared by every leg and the per-leg execution context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::env::LegEnv;
use crate::core::error::{Step, StepError};
use crate::core::leg::{MatrixLeg, PackageSource};
use crate::core::toolchain::{Generator, PackageOverrides};
use crate::pipeline::runner::Debugger;
use crate::util::config::Config;
use crate::util::process::{CommandRunner, ProcessBuilder, ProcessOutput};

/// Wall-clock limits for external processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Provision, configure, build and dependency install.
    pub step: Duration,
    pub smoke: Duration,
    pub legacy: Duration,
}

/// Everything a leg needs to know about the project, resolved once from
/// configuration and command-line flags. Read-only while legs run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub work_dir: PathBuf,
    pub binary_name: String,
    pub release: bool,
    pub generator: Option<Generator>,
    pub generator_var: String,
    pub sudo: bool,
    pub msys_root: PathBuf,
    pub no_provision: bool,
    pub system_packages: PackageOverrides,
    pub msys_packages: PackageOverrides,
    pub jobs: usize,
    pub backend_script: String,
    pub backend_package: String,
    pub smoke_url: String,
    pub sentinel: String,
    /// Pages served on loopback for the smoke test instead of `smoke_url`.
    pub serve_dir: Option<PathBuf>,
    pub smoke_page: String,
    pub legacy_script: Option<PathBuf>,
    pub debugger: Option<Debugger>,
    pub timeouts: Timeouts,
    /// Environment every leg starts from.
    pub base_env: LegEnv,
}

impl Settings {
    /// Resolve settings for a project from merged configuration.
    pub fn from_config(config: &Config, project_root: &Path) -> Self {
        Settings {
            project_root: project_root.to_path_buf(),
            work_dir: config.work_dir(project_root),
            binary_name: config.binary_name(project_root),
            release: config.release(),
            generator: config.matrix.generator,
            generator_var: config.generator_var().to_string(),
            sudo: config.sudo(),
            msys_root: config.msys_root(),
            no_provision: false,
            system_packages: config.package_overrides(PackageSource::System),
            msys_packages: config.package_overrides(PackageSource::Msys),
            jobs: config.jobs(),
            backend_script: config.backend_script().to_string(),
            backend_package: config.backend_package().to_string(),
            smoke_url: config.smoke_url().to_string(),
            sentinel: config.sentinel().to_string(),
            serve_dir: config.serve_dir(project_root),
            smoke_page: config.smoke_page().to_string(),
            legacy_script: config.legacy_script().map(Path::to_path_buf),
            debugger: None,
            timeouts: Timeouts {
                step: config.step_timeout(),
                smoke: config.smoke_timeout(),
                legacy: config.legacy_timeout(),
            },
            base_env: LegEnv::from_host(),
        }
    }

    pub fn package_overrides(&self, source: PackageSource) -> &PackageOverrides {
        match source {
            PackageSource::System => &self.system_packages,
            PackageSource::Msys => &self.msys_packages,
        }
    }

    pub fn generator_for(&self, leg: &MatrixLeg) -> Generator {
        self.generator
            .unwrap_or_else(|| Generator::default_for(leg.platform))
    }

    /// Directory owned by one leg: `<work-dir>/<leg-id>`.
    pub fn leg_dir(&self, leg: &MatrixLeg) -> PathBuf {
        self.work_dir.join(leg.id())
    }

    /// Build output directory of one leg: `<work-dir>/<leg-id>/build`.
    pub fn output_dir(&self, leg: &MatrixLeg) -> PathBuf {
        self.leg_dir(leg).join("build")
    }
}

/// One leg's view of the world while its pipeline runs.
pub struct LegContext<'a> {
    pub leg: &'a MatrixLeg,
    pub settings: &'a Settings,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> LegContext<'a> {
    pub fn new(leg: &'a MatrixLeg, settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        LegContext {
            leg,
            settings,
            runner,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.settings.project_root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.settings.output_dir(self.leg)
    }

    /// Run `cmd` for `step` under the leg environment.
    ///
    /// Spawn failures and timeouts become the step's error; a non-zero exit
    /// is returned to the caller for interpretation.
    pub fn exec(
        &self,
        step: Step,
        env: &LegEnv,
        cmd: ProcessBuilder,
        timeout: Duration,
    ) -> Result<ProcessOutput, StepError> {
        let cmd = env.apply(cmd).timeout(timeout);
        tracing::debug!("[{}] {}", self.leg.id(), cmd.display_command());

        let output = self
            .runner
            .run(&cmd)
            .map_err(|e| StepError::failed(step, format!("{:#}", e)))?;

        if output.timed_out {
            return Err(StepError::Timeout {
                step,
                program: cmd.display_command(),
                secs: timeout.as_secs(),
            });
        }
        Ok(output)
    }
}

/// Short failure message from a process output: exit code plus the tail of
/// stderr, or stdout when stderr is empty.
pub fn failure_message(cmd: &str, output: &ProcessOutput) -> String {
    let code = match output.code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    let tail = if output.stderr.trim().is_empty() {
        let lines: Vec<&str> = output.stdout.lines().collect();
        lines[lines.len().saturating_sub(10)..].join("\n")
    } else {
        output.stderr_tail(10)
    };
    if tail.trim().is_empty() {
        format!("`{}` failed with {}", cmd, code)
    } else {
        format!("`{}` failed with {}\n{}", cmd, code, tail.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leg::{CompilerFamily, Platform};
    use crate::test_support::{MockExecutor, MockProcessOutput};

    #[test]
    fn test_leg_directories_are_disjoint() {
        let settings = Settings::from_config(&Config::default(), Path::new("/proj"));
        let gcc = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let clang = MatrixLeg::new(Platform::Linux, CompilerFamily::Clang);

        assert_eq!(
            settings.output_dir(&gcc),
            Path::new("/proj/target/quay/linux-gcc/build")
        );
        assert!(!settings
            .output_dir(&gcc)
            .starts_with(settings.leg_dir(&clang)));
    }

    #[test]
    fn test_exec_maps_timeout() {
        let settings = Settings::from_config(&Config::default(), Path::new("/proj"));
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let exec = MockExecutor::new();
        exec.expect_prefix("make", MockProcessOutput::timeout());
        let ctx = LegContext::new(&leg, &settings, &exec);

        let err = ctx
            .exec(
                Step::Build,
                &LegEnv::default(),
                ProcessBuilder::new("make").arg("-j2"),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, StepError::Timeout { step: Step::Build, secs: 5, .. }));
    }

    #[test]
    fn test_exec_maps_spawn_failure_to_step() {
        let settings = Settings::from_config(&Config::default(), Path::new("/proj"));
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let exec = MockExecutor::new();
        let ctx = LegContext::new(&leg, &settings, &exec);

        let err = ctx
            .exec(
                Step::Configure,
                &LegEnv::default(),
                ProcessBuilder::new("cmake"),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, StepError::Configure { .. }));
    }

    #[test]
    fn test_failure_message_prefers_stderr() {
        let output = ProcessOutput {
            code: Some(2),
            stdout: "compiling\n".to_string(),
            stderr: "undefined reference to `main`\n".to_string(),
            timed_out: false,
            duration: Duration::ZERO,
        };
        let msg = failure_message("make -j4", &output);
        assert!(msg.starts_with("`make -j4` failed with exit code 2"));
        assert!(msg.contains("undefined reference"));
        assert!(!msg.contains("compiling"));
    }
}
