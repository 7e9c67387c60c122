//! High-level operations.
//!
//! This module contains the implementation of quay commands.

pub mod format;
pub mod orchestrate;
pub mod plan;
pub mod serve;

pub use format::{format_report, format_report_for_output, OutputFormat};
pub use orchestrate::{select_legs, LegSelection, Orchestrator};
pub use plan::{format_plans, plan, plan_leg, LegPlan};
pub use serve::FixtureServer;
