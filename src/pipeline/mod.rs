//! The per-leg pipeline.
//!
//! Each step is a free function taking the leg's [`LegContext`] and the
//! leg environment. Steps never spawn processes themselves; everything goes
//! through the context's [`CommandRunner`](crate::util::process::CommandRunner).
//!
//! Order: provision, configure, build, inspect, substitute, smoke, legacy.

pub mod build;
pub mod configure;
pub mod context;
pub mod inspect;
pub mod provision;
pub mod runner;
pub mod smoke;
pub mod substitute;

pub use context::{LegContext, Settings, Timeouts};
pub use runner::Debugger;
