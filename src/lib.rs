//! Quay - build-matrix orchestration and smoke validation for native
//! applications.
//!
//! Each leg of the matrix (platform x compiler) is provisioned, configured,
//! built, inspected, given a runtime backend, and smoke tested in isolation.
//! Legs run concurrently and never share environment state.

pub mod core;
pub mod ops;
pub mod pipeline;
pub mod util;

/// Test utilities and mocks for quay unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a scripted command runner plus on-disk project and toolchain
/// fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{
    leg::MatrixLeg,
    verdict::{LegVerdict, MatrixReport},
};
pub use ops::Orchestrator;
pub use pipeline::Settings;
pub use util::context::GlobalContext;
