//! Per-leg execution environment.
//!
//! Provisioning never touches the process-wide environment. Instead each leg
//! carries a `LegEnv` value holding its own search path and variables; every
//! subprocess a leg spawns gets that value applied explicitly.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::util::process::ProcessBuilder;

/// Search path and environment variables for one leg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegEnv {
    search_path: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
    provisioned: bool,
}

impl LegEnv {
    /// Start from a snapshot of the host `PATH`.
    pub fn from_host() -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        LegEnv::isolated(search_path)
    }

    /// Start from an explicit search path, ignoring the host `PATH`.
    pub fn isolated(search_path: Vec<PathBuf>) -> Self {
        LegEnv {
            search_path,
            vars: BTreeMap::new(),
            provisioned: false,
        }
    }

    /// Directories searched for executables, highest priority first.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Put `dir` at the front of the search path.
    ///
    /// An existing entry for the same directory is moved rather than
    /// duplicated.
    pub fn with_prepended_path(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.search_path.retain(|p| p != &dir);
        self.search_path.insert(0, dir);
        self
    }

    /// Set an environment variable for every process this leg spawns.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.as_str())
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Mark the toolchain as installed.
    pub fn mark_provisioned(mut self) -> Self {
        self.provisioned = true;
        self
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    /// The search path joined with the platform separator.
    pub fn joined_path(&self) -> Option<OsString> {
        std::env::join_paths(&self.search_path).ok()
    }

    /// Find an executable on this leg's search path only.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let joined = self.joined_path()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(joined), cwd).ok()
    }

    /// Apply this environment to a process about to be spawned.
    pub fn apply(&self, mut cmd: ProcessBuilder) -> ProcessBuilder {
        if let Some(path) = self.joined_path() {
            cmd = cmd.env("PATH", path.to_string_lossy());
        }
        for (key, value) in &self.vars {
            cmd = cmd.env(key, value);
        }
        cmd
    }
}
