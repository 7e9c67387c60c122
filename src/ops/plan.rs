//! Dry-run plans: the commands each leg would run, without running them.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::artifact::BuildArtifact;
use crate::core::leg::{MatrixLeg, PackageSource};
use crate::core::toolchain::{Generator, ResolvedToolchain};
use crate::pipeline::context::Settings;
use crate::pipeline::{build, configure, provision, runner, substitute};

/// What one leg would do.
#[derive(Debug, Clone, Serialize)]
pub struct LegPlan {
    pub leg_id: String,
    pub leg: MatrixLeg,
    pub generator: Generator,
    pub output_dir: PathBuf,
    pub packages: Vec<String>,
    /// `None` when installation is disabled.
    pub install: Option<String>,
    /// `None` when the project has no configure entry point.
    pub configure: Option<String>,
    pub build: String,
    pub backend_install: String,
    pub smoke: String,
    pub legacy: Option<String>,
}

/// Plan one leg.
pub fn plan_leg(leg: &MatrixLeg, settings: &Settings) -> LegPlan {
    let spec = provision::toolchain_spec(leg, settings);
    let tools = ResolvedToolchain::unresolved(&spec);
    let out = settings.output_dir(leg);
    let generator = settings.generator_for(leg);

    let install = (!settings.no_provision).then(|| {
        let manager = PathBuf::from(provision::package_manager(leg.package_source));
        let sudo = (settings.sudo && leg.package_source == PackageSource::System)
            .then(|| PathBuf::from("sudo"));
        provision::install_command(leg.package_source, &manager, sudo.as_deref(), &spec)
            .display_command()
    });

    let configure = configure::detect_entry(&settings.project_root).map(|entry| {
        configure::configure_command(settings, &entry, &out, generator, &tools, Path::new("sh"))
            .display_command()
    });

    let artifact = BuildArtifact::locate(&out, &settings.binary_name, leg.platform);

    LegPlan {
        leg_id: leg.id(),
        leg: leg.clone(),
        generator,
        packages: spec.packages.clone(),
        install,
        configure,
        build: build::build_command(&tools.driver, &out, settings.jobs).display_command(),
        backend_install: substitute::install_command(
            &tools.script_package_manager,
            &settings.backend_package,
            &out,
        )
        .display_command(),
        smoke: runner::smoke_command(&artifact.path, &out, settings.debugger).display_command(),
        legacy: settings.legacy_script.as_ref().map(|script| {
            runner::legacy_command(
                &tools.interpreter,
                &settings.project_root,
                script,
                &artifact.path,
            )
            .display_command()
        }),
        output_dir: out,
    }
}

/// Plan every leg.
pub fn plan(legs: &[MatrixLeg], settings: &Settings) -> Vec<LegPlan> {
    legs.iter().map(|leg| plan_leg(leg, settings)).collect()
}

/// Human-readable rendering of a set of plans.
pub fn format_plans(plans: &[LegPlan]) -> String {
    let mut output = String::new();
    for plan in plans {
        output.push_str(&format!("{}\n", plan.leg));
        output.push_str(&format!("  generator:  {}\n", plan.generator));
        output.push_str(&format!("  output:     {}\n", plan.output_dir.display()));
        output.push_str(&format!("  packages:   {}\n", plan.packages.join(" ")));
        match plan.install {
            Some(ref cmd) => output.push_str(&format!("  install:    {}\n", cmd)),
            None => output.push_str("  install:    (skipped)\n"),
        }
        match plan.configure {
            Some(ref cmd) => output.push_str(&format!("  configure:  {}\n", cmd)),
            None => output.push_str("  configure:  (no CMakeLists.txt or configure script)\n"),
        }
        output.push_str(&format!("  build:      {}\n", plan.build));
        output.push_str(&format!("  backend:    {}\n", plan.backend_install));
        output.push_str(&format!("  smoke:      {}\n", plan.smoke));
        if let Some(ref cmd) = plan.legacy {
            output.push_str(&format!("  legacy:     {}\n", cmd));
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leg::{CompilerFamily, Platform};
    use crate::test_support::{test_settings, FakeToolchain, ProjectFixture};

    #[test]
    fn test_plan_linux_leg() {
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let settings = test_settings(&project, &tools);
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Clang);

        let plan = plan_leg(&leg, &settings);
        assert_eq!(plan.leg_id, "linux-clang");
        assert!(plan.packages.contains(&"clang".to_string()));
        assert!(plan
            .install
            .as_deref()
            .unwrap()
            .starts_with("apt-get install -y --no-install-recommends"));
        assert!(plan.configure.as_deref().unwrap().starts_with("cmake -S"));
        assert_eq!(plan.build, "make -j2");
        assert_eq!(plan.backend_install, "npm install playwright");
        assert!(plan.smoke.ends_with("app smoke.js"));
        assert!(plan.legacy.is_none());
        assert_eq!(plan.output_dir, settings.output_dir(&leg));
    }

    #[test]
    fn test_plan_windows_leg() {
        let project = ProjectFixture::cmake();
        let tools = FakeToolchain::new(&[]);
        let mut settings = test_settings(&project, &tools);
        settings.legacy_script = Some(PathBuf::from("test/run-tests.py"));
        let leg = MatrixLeg::new(Platform::Windows, CompilerFamily::Gcc);

        let plan = plan_leg(&leg, &settings);
        assert!(plan
            .install
            .as_deref()
            .unwrap()
            .starts_with("pacman -S --needed --noconfirm"));
        assert_eq!(plan.build, "mingw32-make -j2");
        assert!(plan.smoke.ends_with("app.exe smoke.js"));
        assert!(plan.legacy.as_deref().unwrap().starts_with("python "));
    }

    #[test]
    fn test_plan_without_provisioning_or_entry() {
        let project = ProjectFixture::empty();
        let tools = FakeToolchain::new(&[]);
        let mut settings = test_settings(&project, &tools);
        settings.no_provision = true;

        let plans = plan(
            &[MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc)],
            &settings,
        );
        assert!(plans[0].install.is_none());
        assert!(plans[0].configure.is_none());

        let text = format_plans(&plans);
        assert!(text.contains("install:    (skipped)"));
        assert!(text.contains("linux-gcc"));
    }
}
