//! Test fixtures: temporary native projects and fake toolchains.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::core::env::LegEnv;
use crate::core::leg::{MatrixLeg, PackageSource};
use crate::core::toolchain::{PackageOverrides, ToolchainSpec};
use crate::pipeline::context::{Settings, Timeouts};
use crate::util::config::Config;

/// A native project on disk.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// A CMake project with the default backend script.
    pub fn cmake() -> Self {
        ProjectFixture::empty()
            .with_file(
                "CMakeLists.txt",
                "cmake_minimum_required(VERSION 3.10)\nproject(app CXX)\n",
            )
            .with_file("src/engine/engine.js", "module.exports = {};\n")
    }

    /// A project driven by a `configure` script.
    pub fn autoconf() -> Self {
        ProjectFixture::empty()
            .with_file("configure", "#!/bin/sh\nexit 0\n")
            .with_file("src/engine/engine.js", "module.exports = {};\n")
    }

    /// A directory with nothing in it.
    pub fn empty() -> Self {
        ProjectFixture {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Add a file relative to the project root.
    pub fn with_file(self, path: impl AsRef<Path>, content: &str) -> Self {
        let full = self.dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        self
    }

    /// Remove a file relative to the project root.
    pub fn without_file(self, path: impl AsRef<Path>) -> Self {
        std::fs::remove_file(self.dir.path().join(path)).unwrap();
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// A directory of fake executables forming a leg's whole search path.
pub struct FakeToolchain {
    dir: TempDir,
}

impl FakeToolchain {
    /// Fake executables with the given names.
    pub fn new(names: &[&str]) -> Self {
        let toolchain = FakeToolchain {
            dir: TempDir::new().unwrap(),
        };
        for name in names {
            toolchain.add(name);
        }
        toolchain
    }

    /// Every tool and the package manager a leg needs.
    pub fn for_leg(leg: &MatrixLeg, spec: &ToolchainSpec) -> Self {
        let mut names: Vec<&str> = spec.tools.iter().map(|(_, name)| name.as_str()).collect();
        names.push(match leg.package_source {
            PackageSource::System => "apt-get",
            PackageSource::Msys => "pacman",
        });
        names.push("sh");
        FakeToolchain::new(&names)
    }

    /// Create one fake executable that succeeds without output.
    pub fn add(&self, name: &str) -> PathBuf {
        self.add_script(name, "exit 0")
    }

    /// Create one fake executable running `body` under `/bin/sh`.
    pub fn add_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self
            .dir
            .path()
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
        write_stub(&path, body);
        path
    }

    /// Remove a fake executable.
    pub fn remove(&self, name: &str) {
        let path = self
            .dir
            .path()
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
        std::fs::remove_file(path).unwrap();
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// An environment whose search path is this directory alone.
    pub fn env(&self) -> LegEnv {
        LegEnv::isolated(vec![self.dir.path().to_path_buf()])
    }
}

/// Write an executable `/bin/sh` script at `path`, creating parents.
pub fn write_stub(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Settings for a fixture project whose legs only see `tools`.
pub fn test_settings(project: &ProjectFixture, tools: &FakeToolchain) -> Settings {
    let mut settings = Settings::from_config(&Config::default(), project.root());
    settings.binary_name = "app".to_string();
    settings.jobs = 2;
    settings.base_env = tools.env();
    settings.system_packages = PackageOverrides::default();
    settings.msys_packages = PackageOverrides::default();
    settings.timeouts = Timeouts {
        step: Duration::from_secs(60),
        smoke: Duration::from_secs(5),
        legacy: Duration::from_secs(60),
    };
    settings
}
