//! Advisory artifact inspection.
//!
//! Nothing here can fail a leg. Every problem found, including I/O errors
//! while probing, ends up as text in the report.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::artifact::{BinaryFormat, BuildArtifact, InspectionReport};
use crate::core::leg::Platform;

/// How deep below the output directory to look for misplaced binaries.
const CANDIDATE_DEPTH: usize = 6;

/// Probe `artifact` for existence, size, and binary format.
pub fn inspect(artifact: &BuildArtifact, platform: Platform, output_dir: &Path) -> InspectionReport {
    let expected_format = BinaryFormat::expected_for(platform);
    let mut report = InspectionReport {
        exists: false,
        size: None,
        format: None,
        expected_format,
        candidates: Vec::new(),
        problems: Vec::new(),
    };

    let metadata = match std::fs::metadata(&artifact.path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            report
                .problems
                .push(format!("{} is not a regular file", artifact.path.display()));
            return report;
        }
        Err(_) => {
            report.candidates = find_candidates(output_dir, &artifact.path);
            let mut problem = format!("artifact not found at {}", artifact.path.display());
            if let Some(first) = report.candidates.first() {
                problem.push_str(&format!(" (found {})", first.display()));
            }
            report.problems.push(problem);
            return report;
        }
    };

    report.exists = true;
    report.size = Some(metadata.len());
    if metadata.len() == 0 {
        report.problems.push("artifact is empty".to_string());
        return report;
    }

    match read_header(&artifact.path) {
        Ok(header) => {
            report.format = BinaryFormat::detect(&header);
            match report.format {
                Some(found) if found == expected_format => {}
                Some(found) => report.problems.push(format!(
                    "expected a {} executable, found {}",
                    expected_format, found
                )),
                None => report.problems.push(format!(
                    "expected a {} executable, found unrecognized content",
                    expected_format
                )),
            }
        }
        Err(e) => report
            .problems
            .push(format!("failed to read {}: {}", artifact.path.display(), e)),
    }

    report
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(4);
    File::open(path)?.take(4).read_to_end(&mut header)?;
    Ok(header)
}

/// Files under `output_dir` with the expected artifact's file name.
fn find_candidates(output_dir: &Path, expected: &Path) -> Vec<PathBuf> {
    let Some(name) = expected.file_name() else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = WalkDir::new(output_dir)
        .max_depth(CANDIDATE_DEPTH)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
        .filter(|p| p != expected)
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact_in(out: &Path, platform: Platform) -> BuildArtifact {
        BuildArtifact::locate(out, "app", platform)
    }

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_valid_elf() {
        let tmp = TempDir::new().unwrap();
        let artifact = artifact_in(tmp.path(), Platform::Linux);
        write(&artifact.path, b"\x7fELF\x02\x01\x01\x00rest");

        let report = inspect(&artifact, Platform::Linux, tmp.path());
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.format, Some(BinaryFormat::Elf));
        assert_eq!(report.size, Some(12));
    }

    #[test]
    fn test_wrong_format() {
        let tmp = TempDir::new().unwrap();
        let artifact = artifact_in(tmp.path(), Platform::Windows);
        write(&artifact.path, b"\x7fELF\x02\x01");

        let report = inspect(&artifact, Platform::Windows, tmp.path());
        assert!(!report.is_ok());
        assert!(report.problems[0].contains("expected a PE executable, found ELF"));
    }

    #[test]
    fn test_empty_file() {
        let tmp = TempDir::new().unwrap();
        let artifact = artifact_in(tmp.path(), Platform::Linux);
        write(&artifact.path, b"");

        let report = inspect(&artifact, Platform::Linux, tmp.path());
        assert!(report.exists);
        assert_eq!(report.problems, vec!["artifact is empty"]);
    }

    #[test]
    fn test_missing_lists_candidates() {
        let tmp = TempDir::new().unwrap();
        let artifact = artifact_in(tmp.path(), Platform::Linux);
        let misplaced = tmp.path().join("src").join("app");
        write(&misplaced, b"\x7fELF");

        let report = inspect(&artifact, Platform::Linux, tmp.path());
        assert!(!report.exists);
        assert_eq!(report.candidates, vec![misplaced]);
        assert!(report.problems[0].starts_with("artifact not found"));
    }

    #[test]
    fn test_missing_output_dir_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("never-created");
        let report = inspect(&artifact_in(&out, Platform::Linux), Platform::Linux, &out);
        assert!(!report.exists);
        assert!(report.candidates.is_empty());
    }
}
