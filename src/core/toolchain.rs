//! Toolchain requirements for a leg.
//!
//! A `ToolchainSpec` lists the packages to install from the leg's package
//! source and the executables expected afterwards. Package names differ per
//! source; executable names mostly do not.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::leg::{CompilerFamily, MatrixLeg, PackageSource, Platform};

/// Build generator handed to CMake; decides which driver runs the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generator {
    #[serde(rename = "unix-makefiles")]
    UnixMakefiles,
    #[serde(rename = "msys-makefiles")]
    MsysMakefiles,
    #[serde(rename = "mingw-makefiles")]
    MinGWMakefiles,
    #[serde(rename = "ninja")]
    Ninja,
}

impl Generator {
    /// Default generator for a platform.
    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::Linux => Generator::UnixMakefiles,
            Platform::Windows => Generator::MinGWMakefiles,
        }
    }

    /// Name passed to `cmake -G`.
    pub fn cmake_name(&self) -> &'static str {
        match self {
            Generator::UnixMakefiles => "Unix Makefiles",
            Generator::MsysMakefiles => "MSYS Makefiles",
            Generator::MinGWMakefiles => "MinGW Makefiles",
            Generator::Ninja => "Ninja",
        }
    }

    /// Executable that consumes the generated build files.
    pub fn driver(&self) -> &'static str {
        match self {
            Generator::UnixMakefiles | Generator::MsysMakefiles => "make",
            Generator::MinGWMakefiles => "mingw32-make",
            Generator::Ninja => "ninja",
        }
    }

    fn driver_package(&self, source: PackageSource) -> &'static str {
        match (source, self) {
            (PackageSource::System, Generator::Ninja) => "ninja-build",
            (PackageSource::System, _) => "make",
            (PackageSource::Msys, Generator::Ninja) => "mingw-w64-x86_64-ninja",
            (PackageSource::Msys, Generator::MinGWMakefiles) => "mingw-w64-x86_64-make",
            (PackageSource::Msys, _) => "make",
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmake_name())
    }
}

impl std::str::FromStr for Generator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', ' '], "-").as_str() {
            "unix-makefiles" | "make" => Ok(Generator::UnixMakefiles),
            "msys-makefiles" => Ok(Generator::MsysMakefiles),
            "mingw-makefiles" | "mingw32-make" => Ok(Generator::MinGWMakefiles),
            "ninja" => Ok(Generator::Ninja),
            _ => Err(format!(
                "unknown generator '{}', valid values: unix-makefiles, msys-makefiles, mingw-makefiles, ninja",
                s
            )),
        }
    }
}

/// Role of an executable in the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Cc,
    Cxx,
    Generator,
    Driver,
    Interpreter,
    ScriptRuntime,
    ScriptPackageManager,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Cc => "CC",
            Tool::Cxx => "CXX",
            Tool::Generator => "generator",
            Tool::Driver => "build driver",
            Tool::Interpreter => "interpreter",
            Tool::ScriptRuntime => "script runtime",
            Tool::ScriptPackageManager => "script package manager",
        }
    }
}

/// Per-source package overrides from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOverrides {
    /// Replaces the default GUI/widget library subset when set.
    pub gui: Option<Vec<String>>,
    /// Appended after the default package set.
    pub extra: Vec<String>,
}

/// Packages and executables one leg requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainSpec {
    /// Packages to install, in install order.
    pub packages: Vec<String>,
    /// Executables expected on the search path afterwards.
    pub tools: Vec<(Tool, String)>,
    pub generator: Generator,
}

impl ToolchainSpec {
    /// Build the spec for a leg.
    pub fn for_leg(leg: &MatrixLeg, generator: Generator, overrides: &PackageOverrides) -> Self {
        let source = leg.package_source;
        let mut packages: Vec<String> = Vec::new();

        packages.extend(compiler_packages(source, leg.compiler));
        packages.push(
            match source {
                PackageSource::System => "cmake",
                PackageSource::Msys => "mingw-w64-x86_64-cmake",
            }
            .to_string(),
        );
        packages.push(generator.driver_package(source).to_string());

        match &overrides.gui {
            Some(gui) => packages.extend(gui.iter().cloned()),
            None => packages.extend(default_gui_packages(source)),
        }

        packages.extend(script_runtime_packages(source));
        packages.push(
            match source {
                PackageSource::System => "python3",
                PackageSource::Msys => "mingw-w64-x86_64-python",
            }
            .to_string(),
        );
        packages.extend(overrides.extra.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        packages.retain(|p| seen.insert(p.clone()));

        let interpreter = match source {
            PackageSource::System => "python3",
            PackageSource::Msys => "python",
        };

        let tools = vec![
            (Tool::Cc, leg.compilers.cc.clone()),
            (Tool::Cxx, leg.compilers.cxx.clone()),
            (Tool::Generator, "cmake".to_string()),
            (Tool::Driver, generator.driver().to_string()),
            (Tool::Interpreter, interpreter.to_string()),
            (Tool::ScriptRuntime, "node".to_string()),
            (Tool::ScriptPackageManager, "npm".to_string()),
        ];

        ToolchainSpec {
            packages,
            tools,
            generator,
        }
    }

    /// Executable name expected for a tool role.
    pub fn tool(&self, tool: Tool) -> Option<&str> {
        self.tools
            .iter()
            .find(|(t, _)| *t == tool)
            .map(|(_, name)| name.as_str())
    }
}

fn compiler_packages(source: PackageSource, compiler: CompilerFamily) -> Vec<String> {
    let names: &[&str] = match (source, compiler) {
        (PackageSource::System, CompilerFamily::Gcc) => &["gcc", "g++"],
        (PackageSource::System, CompilerFamily::Clang) => &["clang"],
        (PackageSource::Msys, CompilerFamily::Gcc) => &["mingw-w64-x86_64-gcc"],
        (PackageSource::Msys, CompilerFamily::Clang) => &["mingw-w64-x86_64-clang"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn default_gui_packages(source: PackageSource) -> Vec<String> {
    let names: &[&str] = match source {
        PackageSource::System => &["qtbase5-dev", "libqt5webkit5-dev"],
        PackageSource::Msys => &["mingw-w64-x86_64-qt5-base", "mingw-w64-x86_64-qtwebkit"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

fn script_runtime_packages(source: PackageSource) -> Vec<String> {
    let names: &[&str] = match source {
        PackageSource::System => &["nodejs", "npm"],
        PackageSource::Msys => &["mingw-w64-x86_64-nodejs"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

/// Executables resolved on a leg's search path after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedToolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub generator: PathBuf,
    pub driver: PathBuf,
    pub interpreter: PathBuf,
    pub script_runtime: PathBuf,
    pub script_package_manager: PathBuf,
}

impl ResolvedToolchain {
    /// A toolchain that refers to each tool by its bare name, for describing
    /// commands without resolving anything.
    pub fn unresolved(spec: &ToolchainSpec) -> Self {
        let name = |tool: Tool| PathBuf::from(spec.tool(tool).unwrap_or_default());
        ResolvedToolchain {
            cc: name(Tool::Cc),
            cxx: name(Tool::Cxx),
            generator: name(Tool::Generator),
            driver: name(Tool::Driver),
            interpreter: name(Tool::Interpreter),
            script_runtime: name(Tool::ScriptRuntime),
            script_package_manager: name(Tool::ScriptPackageManager),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_gcc_spec() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Gcc);
        let spec = ToolchainSpec::for_leg(
            &leg,
            Generator::default_for(Platform::Linux),
            &PackageOverrides::default(),
        );

        assert_eq!(
            spec.packages,
            vec![
                "gcc",
                "g++",
                "cmake",
                "make",
                "qtbase5-dev",
                "libqt5webkit5-dev",
                "nodejs",
                "npm",
                "python3"
            ]
        );
        assert_eq!(spec.tool(Tool::Cxx), Some("g++"));
        assert_eq!(spec.tool(Tool::Driver), Some("make"));
        assert_eq!(spec.tool(Tool::Interpreter), Some("python3"));
    }

    #[test]
    fn test_msys_clang_spec() {
        let leg = MatrixLeg::new(Platform::Windows, CompilerFamily::Clang);
        let spec = ToolchainSpec::for_leg(
            &leg,
            Generator::default_for(Platform::Windows),
            &PackageOverrides::default(),
        );

        assert_eq!(spec.packages[0], "mingw-w64-x86_64-clang");
        assert!(spec.packages.contains(&"mingw-w64-x86_64-make".to_string()));
        assert!(spec.packages.iter().all(|p| p.starts_with("mingw-w64-x86_64-")));
        assert_eq!(spec.tool(Tool::Driver), Some("mingw32-make"));
        assert_eq!(spec.tool(Tool::Interpreter), Some("python"));
    }

    #[test]
    fn test_overrides_replace_gui_and_append_extra() {
        let leg = MatrixLeg::new(Platform::Linux, CompilerFamily::Clang);
        let overrides = PackageOverrides {
            gui: Some(vec!["libgtk-3-dev".to_string()]),
            extra: vec!["pkg-config".to_string(), "clang".to_string()],
        };
        let spec = ToolchainSpec::for_leg(&leg, Generator::Ninja, &overrides);

        assert!(spec.packages.contains(&"libgtk-3-dev".to_string()));
        assert!(!spec.packages.contains(&"qtbase5-dev".to_string()));
        assert!(spec.packages.contains(&"ninja-build".to_string()));
        assert_eq!(spec.packages.last().map(String::as_str), Some("pkg-config"));
        assert_eq!(spec.packages.iter().filter(|p| *p == "clang").count(), 1);
    }

    #[test]
    fn test_generator_parse() {
        assert_eq!("ninja".parse::<Generator>().unwrap(), Generator::Ninja);
        assert_eq!(
            "MinGW Makefiles".parse::<Generator>().unwrap(),
            Generator::MinGWMakefiles
        );
        assert!("xcode".parse::<Generator>().is_err());
    }
}
