//! Core data structures for quay.
//!
//! This module contains the foundational types used throughout quay:
//! - Matrix legs and their isolated environments
//! - Toolchain requirements
//! - Artifacts produced by the pipeline
//! - Verdicts, the leg state machine, and the error taxonomy

pub mod artifact;
pub mod env;
pub mod error;
pub mod leg;
pub mod toolchain;
pub mod verdict;

pub use artifact::{BackendBundle, BinaryFormat, BuildArtifact, InspectionReport, SmokeScript};
pub use env::LegEnv;
pub use error::{ErrorKind, LegacyTestFailure, Step, StepError};
pub use leg::{CompilerFamily, CompilerPair, MatrixLeg, PackageSource, Platform};
pub use toolchain::{Generator, PackageOverrides, ResolvedToolchain, Tool, ToolchainSpec};
pub use verdict::{LegState, LegVerdict, LegacyOutcome, MatrixReport, SmokeOutcome, StepRecord};
