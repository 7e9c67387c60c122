//! User-friendly diagnostic messages.
//!
//! Every failure shown to the user should say what broke and what to try
//! next.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when the project root does not look like a native project.
    pub const PROJECT_ROOT: &str =
        "Run quay from the native project root or pass `--project <dir>`";

    /// Suggestion when a package name is unknown to the package source.
    pub const PACKAGE_NAMES: &str =
        "Adjust `[provision.system]` or `[provision.msys]` packages in Quay.toml";

    /// Suggestion when a tool is missing after provisioning.
    pub const PROVISION: &str = "Run without `--no-provision` to install the toolchain";

    /// Suggestion when configure or build fails.
    pub const VERBOSE: &str = "Run `quay run --verbose` to see the full tool output";

    /// Suggestion when the backend script is missing.
    pub const BACKEND_SCRIPT: &str =
        "Place the backend script under src/engine/ or set `[backend] script` in Quay.toml";

    /// Suggestion for network related failures.
    pub const NETWORK: &str = "Check network connectivity from the build machine";

    /// Suggestion when a process exceeds its wall-clock limit.
    pub const TIMEOUT: &str = "Raise the limit under `[timeouts]` in Quay.toml or with `--timeout`";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("build failed: undefined reference to `main`")
            .with_context("leg: linux-clang")
            .with_suggestion("Check the link line")
            .with_suggestion(suggestions::VERBOSE);

        let output = diag.format(false);
        assert!(output.contains("error: build failed"));
        assert!(output.contains("leg: linux-clang"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("2. Run `quay run --verbose`"));
    }

    #[test]
    fn test_warning_severity() {
        let diag = Diagnostic::warning("artifact is empty");
        assert!(diag.format(false).starts_with("warning: artifact is empty"));
    }
}
