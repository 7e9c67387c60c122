//! Command implementations

pub mod completions;
pub mod inspect;
pub mod plan;
pub mod run;
pub mod smoke;
pub mod toolchain;

use anyhow::Result;

use crate::cli::LegArgs;
use quay::core::MatrixLeg;
use quay::ops::{select_legs, LegSelection};
use quay::util::Config;

impl LegArgs {
    pub fn selection(&self) -> LegSelection {
        if self.all {
            LegSelection::All
        } else if !self.legs.is_empty() {
            LegSelection::Explicit(self.legs.clone())
        } else {
            LegSelection::Host
        }
    }
}

/// Resolve the legs a command acts on.
pub fn legs(config: &Config, args: &LegArgs) -> Result<Vec<MatrixLeg>> {
    select_legs(config, &args.selection())
}
