//! `quay smoke` command
//!
//! Prints the smoke script every leg would run, so it can be reviewed or
//! run by hand against a backend.

use anyhow::Result;

use crate::cli::SmokeArgs;
use quay::pipeline::smoke;
use quay::util::fs::display_relative;
use quay::util::GlobalContext;

pub fn execute(args: SmokeArgs, ctx: &GlobalContext) -> Result<()> {
    let config = ctx.load_config()?;
    let url = args.url.as_deref().unwrap_or(config.smoke_url());
    let sentinel = args.sentinel.as_deref().unwrap_or(config.sentinel());

    let script = smoke::generate(url, sentinel)?;

    if let Some(ref dir) = args.output {
        quay::util::fs::ensure_dir(dir)?;
        let written = smoke::write(&script, dir)?;
        if let Some(ref path) = written.path {
            eprintln!("Wrote {}", display_relative(ctx.cwd(), path));
        }
    }

    if args.digest {
        println!("{}", script.digest);
    } else if args.output.is_none() {
        print!("{}", script.contents);
    }

    Ok(())
}
