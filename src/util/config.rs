//! Configuration file support for quay.
//!
//! quay reads two configuration files:
//! - Global: `~/.quay/config.toml` - user-wide defaults
//! - Project: `Quay.toml` in the native project root
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::leg::{CompilerFamily, PackageSource, Platform};
use crate::core::toolchain::{Generator, PackageOverrides};

/// Name of the project manifest.
pub const MANIFEST_NAME: &str = "Quay.toml";

pub const DEFAULT_GENERATOR_VAR: &str = "CMAKE_GENERATOR";
pub const DEFAULT_MSYS_ROOT: &str = "C:/msys64";
pub const DEFAULT_BACKEND_SCRIPT: &str = "engine.js";
pub const DEFAULT_BACKEND_PACKAGE: &str = "playwright";
pub const DEFAULT_SMOKE_URL: &str = "http://example.com/";
pub const DEFAULT_SENTINEL: &str = "success";
pub const DEFAULT_SMOKE_PAGE: &str = "index.html";
pub const DEFAULT_WORK_DIR: &str = "target/quay";

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_SMOKE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LEGACY_TIMEOUT_SECS: u64 = 1800;

/// quay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub matrix: MatrixConfig,
    pub provision: ProvisionConfig,
    pub backend: BackendConfig,
    pub smoke: SmokeConfig,
    pub legacy: LegacyConfig,
    pub timeouts: TimeoutConfig,
    pub build: BuildConfig,
}

/// The native project being validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Artifact name under `<out>/bin` (defaults to the project directory name)
    pub binary: Option<String>,

    /// Configure a release build (default: true)
    pub release: Option<bool>,
}

/// Which legs make up the matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub platforms: Option<Vec<Platform>>,
    pub compilers: Option<Vec<CompilerFamily>>,

    /// Generator override; defaults per platform
    pub generator: Option<Generator>,

    /// Environment variable carrying the generator name
    pub generator_var: Option<String>,
}

/// Toolchain installation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Prefix system package installs with sudo
    pub sudo: Option<bool>,

    /// MSYS2 installation root
    pub msys_root: Option<PathBuf>,

    /// Overrides for the system package manager
    pub system: PackageConfig,

    /// Overrides for the MSYS2 package manager
    pub msys: PackageConfig,
}

/// Package overrides for one package source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Replaces the default GUI/widget library subset
    pub gui: Option<Vec<String>>,

    /// Appended to the default package set
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Script under `src/engine/` copied next to the binary
    pub script: Option<String>,

    /// Package installed next to the script
    pub package: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    pub url: Option<String>,
    pub sentinel: Option<String>,

    /// Directory of test pages served on loopback; replaces `url` when set
    pub serve: Option<PathBuf>,

    /// Page under `serve` the smoke test loads
    pub page: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Legacy suite entry point, relative to the project root
    pub script: Option<PathBuf>,
}

/// Wall-clock limits in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub step: Option<u64>,
    pub smoke: Option<u64>,
    pub legacy: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel jobs handed to the build driver (None = all cores)
    pub jobs: Option<usize>,

    /// Where leg directories are created, relative to the project root
    pub work_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        fn take<T>(slot: &mut Option<T>, other: Option<T>) {
            if other.is_some() {
                *slot = other;
            }
        }

        take(&mut self.project.binary, other.project.binary);
        take(&mut self.project.release, other.project.release);

        take(&mut self.matrix.platforms, other.matrix.platforms);
        take(&mut self.matrix.compilers, other.matrix.compilers);
        take(&mut self.matrix.generator, other.matrix.generator);
        take(&mut self.matrix.generator_var, other.matrix.generator_var);

        take(&mut self.provision.sudo, other.provision.sudo);
        take(&mut self.provision.msys_root, other.provision.msys_root);
        for (mine, theirs) in [
            (&mut self.provision.system, other.provision.system),
            (&mut self.provision.msys, other.provision.msys),
        ] {
            take(&mut mine.gui, theirs.gui);
            if !theirs.extra.is_empty() {
                mine.extra = theirs.extra;
            }
        }

        take(&mut self.backend.script, other.backend.script);
        take(&mut self.backend.package, other.backend.package);

        take(&mut self.smoke.url, other.smoke.url);
        take(&mut self.smoke.sentinel, other.smoke.sentinel);
        take(&mut self.smoke.serve, other.smoke.serve);
        take(&mut self.smoke.page, other.smoke.page);

        take(&mut self.legacy.script, other.legacy.script);

        take(&mut self.timeouts.step, other.timeouts.step);
        take(&mut self.timeouts.smoke, other.timeouts.smoke);
        take(&mut self.timeouts.legacy, other.timeouts.legacy);

        take(&mut self.build.jobs, other.build.jobs);
        take(&mut self.build.work_dir, other.build.work_dir);
    }

    /// Platforms in the full matrix.
    pub fn platforms(&self) -> Vec<Platform> {
        self.matrix
            .platforms
            .clone()
            .unwrap_or_else(|| Platform::ALL.to_vec())
    }

    /// Compiler families in the full matrix.
    pub fn compilers(&self) -> Vec<CompilerFamily> {
        self.matrix
            .compilers
            .clone()
            .unwrap_or_else(|| CompilerFamily::ALL.to_vec())
    }

    /// Generator for a platform, honouring the override.
    pub fn generator_for(&self, platform: Platform) -> Generator {
        self.matrix
            .generator
            .unwrap_or_else(|| Generator::default_for(platform))
    }

    pub fn generator_var(&self) -> &str {
        self.matrix
            .generator_var
            .as_deref()
            .unwrap_or(DEFAULT_GENERATOR_VAR)
    }

    pub fn release(&self) -> bool {
        self.project.release.unwrap_or(true)
    }

    /// Artifact name, falling back to the project directory name.
    pub fn binary_name(&self, project_root: &Path) -> String {
        self.project.binary.clone().unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "app".to_string())
        })
    }

    pub fn sudo(&self) -> bool {
        self.provision.sudo.unwrap_or(false)
    }

    pub fn msys_root(&self) -> PathBuf {
        self.provision
            .msys_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MSYS_ROOT))
    }

    /// Package overrides for a package source.
    pub fn package_overrides(&self, source: PackageSource) -> PackageOverrides {
        let cfg = match source {
            PackageSource::System => &self.provision.system,
            PackageSource::Msys => &self.provision.msys,
        };
        PackageOverrides {
            gui: cfg.gui.clone(),
            extra: cfg.extra.clone(),
        }
    }

    pub fn backend_script(&self) -> &str {
        self.backend
            .script
            .as_deref()
            .unwrap_or(DEFAULT_BACKEND_SCRIPT)
    }

    pub fn backend_package(&self) -> &str {
        self.backend
            .package
            .as_deref()
            .unwrap_or(DEFAULT_BACKEND_PACKAGE)
    }

    pub fn smoke_url(&self) -> &str {
        self.smoke.url.as_deref().unwrap_or(DEFAULT_SMOKE_URL)
    }

    pub fn sentinel(&self) -> &str {
        self.smoke.sentinel.as_deref().unwrap_or(DEFAULT_SENTINEL)
    }

    /// Fixture directory to serve, resolved against the project root.
    pub fn serve_dir(&self, project_root: &Path) -> Option<PathBuf> {
        self.smoke.serve.as_ref().map(|dir| project_root.join(dir))
    }

    pub fn smoke_page(&self) -> &str {
        self.smoke.page.as_deref().unwrap_or(DEFAULT_SMOKE_PAGE)
    }

    pub fn legacy_script(&self) -> Option<&Path> {
        self.legacy.script.as_deref()
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.step.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS))
    }

    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.smoke.unwrap_or(DEFAULT_SMOKE_TIMEOUT_SECS))
    }

    pub fn legacy_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.legacy.unwrap_or(DEFAULT_LEGACY_TIMEOUT_SECS))
    }

    /// Parallel jobs for the build driver.
    pub fn jobs(&self) -> usize {
        self.build.jobs.filter(|j| *j > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Absolute work directory for a project.
    pub fn work_dir(&self, project_root: &Path) -> PathBuf {
        let dir = self
            .build
            .work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
        if dir.is_absolute() {
            dir
        } else {
            project_root.join(dir)
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (Quay.toml)
/// 2. Global config (~/.quay/config.toml)
/// 3. Defaults
///
/// A broken global config only produces a warning; a broken project config
/// is an error.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load(project_path)?);
    }

    Ok(config)
}

/// Get the global quay config directory (~/.quay).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".quay"))
}

/// Get the global config path (~/.quay/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project manifest path.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(MANIFEST_NAME)
}
