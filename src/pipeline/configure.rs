//! Native project configuration.

use std::path::{Path, PathBuf};

use crate::core::env::LegEnv;
use crate::core::error::{Step, StepError};
use crate::core::toolchain::{Generator, ResolvedToolchain};
use crate::pipeline::context::{failure_message, LegContext, Settings};
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// Configuration entry point found in a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigureEntry {
    /// `CMakeLists.txt`
    CMake(PathBuf),
    /// A `configure` shell script
    Script(PathBuf),
}

impl ConfigureEntry {
    pub fn path(&self) -> &Path {
        match self {
            ConfigureEntry::CMake(p) | ConfigureEntry::Script(p) => p,
        }
    }
}

/// Find the configuration entry point; CMake wins when both exist.
pub fn detect_entry(root: &Path) -> Option<ConfigureEntry> {
    let cmake = root.join("CMakeLists.txt");
    if cmake.is_file() {
        return Some(ConfigureEntry::CMake(cmake));
    }
    let script = root.join("configure");
    if script.is_file() {
        return Some(ConfigureEntry::Script(script));
    }
    None
}

/// Command that configures `entry` into `out`.
///
/// The compiler pair and generator travel through the environment so
/// configure scripts see them too.
pub fn configure_command(
    settings: &Settings,
    entry: &ConfigureEntry,
    out: &Path,
    generator: Generator,
    tools: &ResolvedToolchain,
    shell: &Path,
) -> ProcessBuilder {
    let cmd = match entry {
        ConfigureEntry::CMake(_) => ProcessBuilder::new(&tools.generator)
            .arg("-S")
            .arg(&settings.project_root)
            .arg("-B")
            .arg(out)
            .arg("-G")
            .arg(generator.cmake_name())
            .arg(format!(
                "-DCMAKE_BUILD_TYPE={}",
                if settings.release { "Release" } else { "Debug" }
            )),
        ConfigureEntry::Script(script) => ProcessBuilder::new(shell).arg(script),
    };

    cmd.cwd(out)
        .env("CC", tools.cc.to_string_lossy())
        .env("CXX", tools.cxx.to_string_lossy())
        .env(&settings.generator_var, generator.cmake_name())
}

/// Configure the project for one leg; returns the output directory.
pub fn configure(
    ctx: &LegContext<'_>,
    env: &LegEnv,
    tools: &ResolvedToolchain,
) -> Result<PathBuf, StepError> {
    let root = ctx.project_root();
    let entry = detect_entry(root).ok_or_else(|| StepError::NoConfigureEntry {
        root: root.to_path_buf(),
    })?;

    let out = ctx.output_dir();
    ensure_dir(&out).map_err(|e| StepError::failed(Step::Configure, format!("{:#}", e)))?;

    let generator = ctx.settings.generator_for(ctx.leg);
    let shell = env.resolve("sh").unwrap_or_else(|| PathBuf::from("sh"));
    let cmd = configure_command(ctx.settings, &entry, &out, generator, tools, &shell);
    let display = cmd.display_command();

    tracing::info!(
        "[{}] Configuring {} ({})",
        ctx.leg.id(),
        entry.path().display(),
        generator
    );

    let output = ctx.exec(Step::Configure, env, cmd, ctx.settings.timeouts.step)?;
    if !output.success() {
        return Err(StepError::Configure {
            message: failure_message(&display, &output),
        });
    }

    Ok(out)
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
    fn test_detect_entry() {
        let project = ProjectFixture::cmake();
        assert!(matches!(
            detect_entry(project.root()),
            Some(ConfigureEntry::CMake(_))
        ));

        let project = ProjectFixture::autoconf();
        assert!(matches!(
            detect_entry(project.root()),
            Some(ConfigureEntry::Script(_))
        ));

        assert_eq!(detect_entry(ProjectFixture::empty().root()), None);
    }

    #[test]
    fn test_cmake_command_and_env() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Clang);
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let mut settings = test_settings(&project, &tools);
        settings.release = false;
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let out = settings.output_dir(&leg);
        let entry = detect_entry(project.root()).unwrap();

        let cmd = configure_command(
            &settings,
            &entry,
            &out,
            Generator::UnixMakefiles,
            &resolved,
            Path::new("sh"),
        );

        let args = cmd.get_args();
        assert_eq!(cmd.get_program(), Path::new("cmake"));
        assert_eq!(args[0], "-S");
        assert!(args.contains(&"Unix Makefiles".to_string()));
        assert!(args.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert_eq!(cmd.get_env("CC"), Some("clang"));
        assert_eq!(cmd.get_env("CXX"), Some("clang++"));
        assert_eq!(cmd.get_env("CMAKE_GENERATOR"), Some("Unix Makefiles"));
        assert_eq!(cmd.get_cwd(), Some(out.as_path()));
    }

    #[test]
    fn test_custom_generator_var() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let project = ProjectFixture::autoconf();
        let tools = FakeToolchain::new(&[]);
        let mut settings = test_settings(&project, &tools);
        settings.generator_var = "GENERATOR".to_string();
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let entry = detect_entry(project.root()).unwrap();

        let cmd = configure_command(
            &settings,
            &entry,
            Path::new("/out"),
            Generator::Ninja,
            &resolved,
            Path::new("/bin/sh"),
        );
        assert_eq!(cmd.get_program(), Path::new("/bin/sh"));
        assert_eq!(cmd.get_env("GENERATOR"), Some("Ninja"));
        assert_eq!(cmd.get_env("CMAKE_GENERATOR"), None);
    }

    #[test]
    fn test_missing_entry_spawns_nothing() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let project = ProjectFixture::empty();
        let tools = FakeToolchain::new(&[]);
        let settings = test_settings(&project, &tools);
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let exec = MockExecutor::new();
        let ctx = LegContext::new(&leg, &settings, &exec);

        let err = configure(&ctx, &tools.env(), &resolved).unwrap_err();
        assert!(matches!(err, StepError::NoConfigureEntry { .. }));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_configure_failure() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let settings = test_settings(&project, &tools);
        let resolved = ResolvedToolchain::unresolved(&toolchain_spec(&leg, &settings));
        let exec = MockExecutor::new();
        exec.expect_prefix(
            "cmake -S",
            MockProcessOutput::failure(1, "CMake Error: Could not find Qt5"),
        );
        let ctx = LegContext::new(&leg, &settings, &exec);

        let err = configure(&ctx, &tools.env(), &resolved).unwrap_err();
        assert!(matches!(err, StepError::Configure { ref message } if message.contains("Qt5")));
        assert!(settings.output_dir(&leg).is_dir());
    }
}
