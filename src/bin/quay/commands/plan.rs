//! `quay plan` command

use anyhow::{Context, Result};

use crate::cli::PlanArgs;
use quay::ops::{format_plans, plan};
use quay::pipeline::Settings;
use quay::util::GlobalContext;

pub fn execute(args: PlanArgs, ctx: &GlobalContext) -> Result<()> {
    let config = ctx.load_config()?;
    let legs = super::legs(&config, &args.legs)?;

    let mut settings = Settings::from_config(&config, ctx.project_root());
    settings.no_provision = args.no_provision;

    let plans = plan(&legs, &settings);
    if args.json {
        let json = serde_json::to_string_pretty(&plans).context("failed to serialize plan")?;
        println!("{}", json);
    } else {
        print!("{}", format_plans(&plans));
    }

    Ok(())
}
