//! Global context for quay operations.
//!
//! Provides centralized access to paths, configuration, and output settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{self, Config, MANIFEST_NAME};

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Native project root
    project_root: PathBuf,

    /// Home directory for global quay data (~/.quay/)
    home: Option<PathBuf>,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a context rooted at the current directory.
    ///
    /// The project root is the nearest ancestor containing `Quay.toml`, or
    /// the current directory when there is none.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let project_root = find_project_root(&cwd).unwrap_or_else(|| cwd.clone());

        Ok(GlobalContext {
            cwd,
            project_root,
            home: config::global_config_dir(),
            verbose: false,
            color: true,
        })
    }

    /// Create a context for an explicit project directory.
    pub fn with_project(project_root: impl AsRef<Path>) -> Result<Self> {
        let mut ctx = Self::new()?;
        let root = project_root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            ctx.cwd.join(root)
        };
        if !root.is_dir() {
            anyhow::bail!("project directory does not exist: {}", root.display());
        }
        ctx.project_root = root;
        Ok(ctx)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the quay home directory (~/.quay/), if a home directory exists.
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Get the global configuration file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|h| h.join("config.toml"))
    }

    /// Get the project manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        config::project_config_path(&self.project_root)
    }

    /// Load and merge global and project configuration.
    pub fn load_config(&self) -> Result<Config> {
        config::load_config(self.global_config_path().as_deref(), &self.manifest_path())
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }
}

/// Search `start` and its ancestors for a directory holding `Quay.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MANIFEST_NAME).is_file())
        .map(Path::to_path_buf)
}
