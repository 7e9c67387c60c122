//! Per-leg state machine and verdicts.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::core::artifact::BuildArtifact;
use crate::core::error::{ErrorKind, LegacyTestFailure, Step, StepError};
use crate::core::leg::MatrixLeg;

/// Where a leg is in its pipeline.
///
/// The happy path is strictly linear. Any fatal error jumps straight to
/// `Done { passed: false }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum LegState {
    Pending,
    Provisioned,
    Configured,
    Built,
    BackendReady,
    SmokeTested,
    Done { passed: bool },
}

impl LegState {
    /// The state that follows this one on the happy path.
    pub fn successor(&self) -> Option<LegState> {
        match self {
            LegState::Pending => Some(LegState::Provisioned),
            LegState::Provisioned => Some(LegState::Configured),
            LegState::Configured => Some(LegState::Built),
            LegState::Built => Some(LegState::BackendReady),
            LegState::BackendReady => Some(LegState::SmokeTested),
            LegState::SmokeTested => Some(LegState::Done { passed: true }),
            LegState::Done { .. } => None,
        }
    }

    /// Move to `next`, which must be the successor or a failed `Done`.
    pub fn advance(self, next: LegState) -> Result<LegState, InvalidTransition> {
        let allowed = match next {
            LegState::Done { passed: false } => !self.is_done(),
            _ => self.successor() == Some(next),
        };
        if allowed {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, LegState::Done { .. })
    }
}

impl fmt::Display for LegState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegState::Pending => write!(f, "Pending"),
            LegState::Provisioned => write!(f, "Provisioned"),
            LegState::Configured => write!(f, "Configured"),
            LegState::Built => write!(f, "Built"),
            LegState::BackendReady => write!(f, "BackendReady"),
            LegState::SmokeTested => write!(f, "SmokeTested"),
            LegState::Done { passed: true } => write!(f, "Done(pass)"),
            LegState::Done { passed: false } => write!(f, "Done(fail)"),
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid leg transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LegState,
    pub to: LegState,
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub passed: bool,
    pub message: String,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    pub warnings: Vec<String>,
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl StepRecord {
    /// Create a passing record.
    pub fn pass(step: Step, message: impl Into<String>, duration: Duration) -> Self {
        StepRecord {
            step,
            passed: true,
            message: message.into(),
            duration,
            warnings: Vec::new(),
        }
    }

    /// Create a failing record.
    pub fn fail(step: Step, message: impl Into<String>, duration: Duration) -> Self {
        StepRecord {
            step,
            passed: false,
            message: message.into(),
            duration,
            warnings: Vec::new(),
        }
    }

    /// Add a warning to the record.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// What the smoke run reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeOutcome {
    pub exit_code: Option<i32>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub passed: bool,
}

/// What the legacy suite reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyOutcome {
    pub exit_code: Option<i32>,
    pub failure: Option<LegacyTestFailure>,
}

impl LegacyOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Steps whose failure fails the leg.
const FATAL_STEPS: [Step; 5] = [
    Step::Provision,
    Step::Configure,
    Step::Build,
    Step::BackendSubstitution,
    Step::SmokeTest,
];

/// Steps that must have passed for the leg to pass.
const REQUIRED_STEPS: [Step; 3] = [Step::Configure, Step::Build, Step::SmokeTest];

/// Verdict for one leg.
#[derive(Debug, Clone, Serialize)]
pub struct LegVerdict {
    pub leg_id: String,
    pub leg: MatrixLeg,
    pub state: LegState,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BuildArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke: Option<SmokeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How to fix the fatal error, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,
    pub passed: bool,
}

impl LegVerdict {
    /// Start a verdict for a pending leg.
    pub fn new(leg: &MatrixLeg) -> Self {
        LegVerdict {
            leg_id: leg.id(),
            leg: leg.clone(),
            state: LegState::Pending,
            steps: Vec::new(),
            artifact: None,
            smoke: None,
            smoke_digest: None,
            legacy: None,
            failed_step: None,
            error_kind: None,
            error: None,
            suggestions: Vec::new(),
            total_duration: Duration::ZERO,
            passed: false,
        }
    }

    /// Move along the happy path.
    pub fn advance(&mut self, next: LegState) {
        match self.state.advance(next) {
            Ok(state) => self.state = state,
            Err(e) => tracing::warn!("[{}] {}", self.leg_id, e),
        }
    }

    /// Append a step record.
    pub fn record(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    /// Record a fatal error and move to `Done(fail)`.
    pub fn fail(&mut self, error: &StepError, duration: Duration) {
        self.record(StepRecord::fail(error.step(), error.to_string(), duration));
        self.failed_step = Some(error.step());
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
        self.suggestions = error.to_diagnostic().suggestions;
        self.state = LegState::Done { passed: false };
        self.passed = false;
    }

    /// Record for a step, if it ran.
    pub fn result_of(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn configure_result(&self) -> Option<bool> {
        self.result_of(Step::Configure).map(|r| r.passed)
    }

    pub fn build_result(&self) -> Option<bool> {
        self.result_of(Step::Build).map(|r| r.passed)
    }

    pub fn smoke_test_result(&self) -> Option<bool> {
        self.result_of(Step::SmokeTest).map(|r| r.passed)
    }

    pub fn legacy_test_result(&self) -> Option<bool> {
        self.legacy.as_ref().map(|l| l.passed())
    }

    /// Compute the overall result and settle into `Done`.
    ///
    /// Inspection and legacy results are never consulted.
    pub fn finish(&mut self, total: Duration) {
        self.total_duration = total;
        let fatal_failed = self
            .steps
            .iter()
            .any(|r| FATAL_STEPS.contains(&r.step) && !r.passed);
        let required_passed = REQUIRED_STEPS
            .iter()
            .all(|s| self.result_of(*s).is_some_and(|r| r.passed));

        self.passed = self.failed_step.is_none() && !fatal_failed && required_passed;
        self.state = LegState::Done {
            passed: self.passed,
        };
    }

    /// Every warning attached to any step.
    pub fn warnings(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.warnings.iter().map(|w| w.as_str()))
            .collect()
    }
}

/// Verdicts for every leg that ran.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub verdicts: Vec<LegVerdict>,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,
    pub passed: bool,
}

impl MatrixReport {
    pub fn new(verdicts: Vec<LegVerdict>, total_duration: Duration) -> Self {
        let passed = !verdicts.is_empty() && verdicts.iter().all(|v| v.passed);
        MatrixReport {
            verdicts,
            total_duration,
            passed,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.passed).count()
    }

    pub fn verdict(&self, leg_id: &str) -> Option<&LegVerdict> {
        self.verdicts.iter().find(|v| v.leg_id == leg_id)
    }
}
