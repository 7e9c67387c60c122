//! Step error taxonomy.
//!
//! Every fatal failure inside a leg is a `StepError`. The legacy test suite
//! is the one exception: its failures are recorded as
//! [`LegacyTestFailure`] values and never become a `StepError`.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::core::leg::PackageSource;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// A step of the per-leg pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    Provision,
    Configure,
    Build,
    Inspect,
    BackendSubstitution,
    SmokeTest,
    LegacyTest,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Provision => "Provision",
            Step::Configure => "Configure",
            Step::Build => "Build",
            Step::Inspect => "Inspect",
            Step::BackendSubstitution => "BackendSubstitution",
            Step::SmokeTest => "SmokeTest",
            Step::LegacyTest => "LegacyTest",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse classification of a fatal error, as surfaced in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ProvisionError,
    ConfigureError,
    BuildError,
    SubstitutionError,
    SmokeTestFailure,
    TimeoutError,
    InspectionError,
    LegacyTestFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ProvisionError => "ProvisionError",
            ErrorKind::ConfigureError => "ConfigureError",
            ErrorKind::BuildError => "BuildError",
            ErrorKind::SubstitutionError => "SubstitutionError",
            ErrorKind::SmokeTestFailure => "SmokeTestFailure",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::InspectionError => "InspectionError",
            ErrorKind::LegacyTestFailure => "LegacyTestFailure",
        };
        f.write_str(s)
    }
}

/// Fatal failure of a pipeline step.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum StepError {
    #[error("packages unavailable from {origin}: {}", .packages.join(" "))]
    #[diagnostic(
        code(quay::provision::unavailable),
        help("check the package names for this source or override them in Quay.toml")
    )]
    PackagesUnavailable {
        packages: Vec<String>,
        origin: PackageSource,
        message: String,
    },

    #[error("{role} `{tool}` not found on the leg search path")]
    #[diagnostic(code(quay::provision::tool_not_found))]
    ToolNotFound { role: &'static str, tool: String },

    #[error("provisioning failed: {message}")]
    #[diagnostic(code(quay::provision::failed))]
    Provision { message: String },

    #[error("toolchain already provisioned for this leg")]
    #[diagnostic(code(quay::provision::already_provisioned))]
    AlreadyProvisioned,

    #[error("no configuration entry point in {}", .root.display())]
    #[diagnostic(
        code(quay::configure::no_entry),
        help("expected CMakeLists.txt or an executable `configure` script")
    )]
    NoConfigureEntry { root: PathBuf },

    #[error("configuration failed: {message}")]
    #[diagnostic(code(quay::configure::failed))]
    Configure { message: String },

    #[error("build failed: {message}")]
    #[diagnostic(code(quay::build::failed))]
    Build { message: String },

    #[error("backend script not found: {}", .path.display())]
    #[diagnostic(code(quay::backend::missing_script))]
    MissingBackendScript {
        path: PathBuf,
        available: Vec<String>,
    },

    #[error("backend substitution failed: {message}")]
    #[diagnostic(code(quay::backend::install_failed))]
    Substitution { message: String },

    #[error("smoke test failed: {message}")]
    #[diagnostic(code(quay::smoke::failed))]
    SmokeTest {
        status: Option<String>,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("{step} timed out after {secs}s running `{program}`")]
    #[diagnostic(code(quay::timeout))]
    Timeout {
        step: Step,
        program: String,
        secs: u64,
    },

    #[error("{step} failed: {message}")]
    #[diagnostic(code(quay::step::failed))]
    Failed { step: Step, message: String },
}

impl StepError {
    /// Generic failure of `step`, e.g. a tool that could not be spawned.
    ///
    /// Advisory steps have no variant of their own and keep their step.
    pub fn failed(step: Step, message: impl Into<String>) -> Self {
        let message = message.into();
        match step {
            Step::Provision => StepError::Provision { message },
            Step::Configure => StepError::Configure { message },
            Step::Build => StepError::Build { message },
            Step::BackendSubstitution => StepError::Substitution { message },
            Step::SmokeTest => StepError::SmokeTest {
                status: None,
                exit_code: None,
                message,
            },
            Step::Inspect | Step::LegacyTest => StepError::Failed { step, message },
        }
    }

    /// The pipeline step this error belongs to.
    pub fn step(&self) -> Step {
        match self {
            StepError::PackagesUnavailable { .. }
            | StepError::ToolNotFound { .. }
            | StepError::Provision { .. }
            | StepError::AlreadyProvisioned => Step::Provision,
            StepError::NoConfigureEntry { .. } | StepError::Configure { .. } => Step::Configure,
            StepError::Build { .. } => Step::Build,
            StepError::MissingBackendScript { .. } | StepError::Substitution { .. } => {
                Step::BackendSubstitution
            }
            StepError::SmokeTest { .. } => Step::SmokeTest,
            StepError::Timeout { step, .. } | StepError::Failed { step, .. } => *step,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Timeout { .. } => ErrorKind::TimeoutError,
            _ => match self.step() {
                Step::Provision => ErrorKind::ProvisionError,
                Step::Configure => ErrorKind::ConfigureError,
                Step::Build => ErrorKind::BuildError,
                Step::BackendSubstitution => ErrorKind::SubstitutionError,
                Step::SmokeTest => ErrorKind::SmokeTestFailure,
                Step::Inspect => ErrorKind::InspectionError,
                Step::LegacyTest => ErrorKind::LegacyTestFailure,
            },
        }
    }

    /// Convert to a user-facing diagnostic with suggestions.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string()).with_context(format!("kind: {}", self.kind()));
        match self {
            StepError::PackagesUnavailable { message, .. } => diag
                .with_context(message.clone())
                .with_suggestion(suggestions::PACKAGE_NAMES),
            StepError::ToolNotFound { tool, .. } => diag
                .with_suggestion(format!("Install `{}` or add its directory to PATH", tool))
                .with_suggestion(suggestions::PROVISION),
            StepError::Provision { .. } => diag.with_suggestion(suggestions::PACKAGE_NAMES),
            StepError::AlreadyProvisioned => diag,
            StepError::NoConfigureEntry { root } => diag
                .with_location(root.clone())
                .with_suggestion(suggestions::PROJECT_ROOT),
            StepError::Configure { .. } | StepError::Build { .. } | StepError::Failed { .. } => {
                diag.with_suggestion(suggestions::VERBOSE)
            }
            StepError::MissingBackendScript { available, .. } => {
                let diag = if available.is_empty() {
                    diag
                } else {
                    diag.with_context(format!("available engine scripts: {}", available.join(", ")))
                };
                diag.with_suggestion(suggestions::BACKEND_SCRIPT)
            }
            StepError::Substitution { .. } => diag.with_suggestion(suggestions::NETWORK),
            StepError::SmokeTest { status, .. } => {
                let diag = match status {
                    Some(s) => diag.with_context(format!("reported status: {}", s)),
                    None => diag,
                };
                diag.with_suggestion(suggestions::NETWORK)
            }
            StepError::Timeout { .. } => diag.with_suggestion(suggestions::TIMEOUT),
        }
    }
}

/// Non-zero exit from the legacy test suite.
///
/// Recorded on the verdict and never propagated as a leg failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyTestFailure {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub message: String,
}

impl fmt::Display for LegacyTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "legacy suite timed out: {}", self.message)
        } else {
            write!(
                f,
                "legacy suite exited with {:?}: {}",
                self.exit_code, self.message
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_step() {
        let err = StepError::Build {
            message: "link error".to_string(),
        };
        assert_eq!(err.step(), Step::Build);
        assert_eq!(err.kind(), ErrorKind::BuildError);

        let err = StepError::MissingBackendScript {
            path: PathBuf::from("src/engine/engine.js"),
            available: vec![],
        };
        assert_eq!(err.step(), Step::BackendSubstitution);
        assert_eq!(err.kind(), ErrorKind::SubstitutionError);
    }

    #[test]
    fn test_failed_maps_step_to_variant() {
        assert!(matches!(
            StepError::failed(Step::Build, "x"),
            StepError::Build { .. }
        ));
        assert!(matches!(
            StepError::failed(Step::BackendSubstitution, "x"),
            StepError::Substitution { .. }
        ));
        assert_eq!(
            StepError::failed(Step::Provision, "x").kind(),
            ErrorKind::ProvisionError
        );
    }

    #[test]
    fn test_failed_keeps_advisory_steps() {
        let err = StepError::failed(Step::LegacyTest, "could not spawn python3");
        assert!(matches!(err, StepError::Failed { .. }));
        assert_eq!(err.step(), Step::LegacyTest);
        assert_eq!(err.kind(), ErrorKind::LegacyTestFailure);
        assert!(err.to_string().starts_with("LegacyTest failed"));

        let err = StepError::failed(Step::Inspect, "unreadable");
        assert_eq!(err.step(), Step::Inspect);
        assert_eq!(err.kind(), ErrorKind::InspectionError);

        let err = StepError::failed(Step::SmokeTest, "no such file");
        assert!(matches!(err, StepError::SmokeTest { .. }));
        assert_eq!(err.kind(), ErrorKind::SmokeTestFailure);
    }

    #[test]
    fn test_timeout_keeps_step() {
        let err = StepError::Timeout {
            step: Step::SmokeTest,
            program: "bin/app".to_string(),
            secs: 30,
        };
        assert_eq!(err.step(), Step::SmokeTest);
        assert_eq!(err.kind(), ErrorKind::TimeoutError);
        assert!(err.to_string().contains("timed out after 30s"));
    }

    #[test]
    fn test_diagnostic_lists_available_scripts() {
        let err = StepError::MissingBackendScript {
            path: PathBuf::from("src/engine/engine.js"),
            available: vec!["old.js".to_string()],
        };
        let text = err.to_diagnostic().format(false);
        assert!(text.contains("available engine scripts: old.js"));
        assert!(text.contains("help: consider:"));
    }
}
