//! `quay inspect` command

use anyhow::{bail, Context, Result};

use crate::cli::InspectArgs;
use quay::core::{BuildArtifact, Platform};
use quay::pipeline::inspect::inspect;

pub fn execute(args: InspectArgs) -> Result<()> {
    let platform = match args.platform {
        Some(ref p) => p
            .parse::<Platform>()
            .with_context(|| format!("invalid platform: {}", p))?,
        None => match Platform::host() {
            Some(p) => p,
            None => bail!("unsupported host platform; pass --platform"),
        },
    };

    let path = &args.path;
    let binary_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let artifact = BuildArtifact {
        path: path.clone(),
        binary_name,
        exists: path.is_file(),
        inspection: None,
    };
    let search_root = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();

    let report = inspect(&artifact, platform, &search_root);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Artifact: {}", path.display());
        println!("  Exists:   {}", if report.exists { "yes" } else { "no" });
        if let Some(size) = report.size {
            println!("  Size:     {} bytes", size);
        }
        println!(
            "  Format:   {} (expected {})",
            report
                .format
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            report.expected_format
        );
        for candidate in &report.candidates {
            println!("  Candidate: {}", candidate.display());
        }
        for problem in &report.problems {
            println!("  Warning:  {}", problem);
        }
    }

    // Inspection is advisory; a report with problems is still a success.
    Ok(())
}
