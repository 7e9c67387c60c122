//! Values produced by the pipeline steps.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::leg::Platform;

/// Executable container format, detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryFormat {
    Elf,
    Pe,
    MachO,
    Script,
}

impl BinaryFormat {
    /// Format a leg's artifacts are expected to have.
    pub fn expected_for(platform: Platform) -> Self {
        match platform {
            Platform::Linux => BinaryFormat::Elf,
            Platform::Windows => BinaryFormat::Pe,
        }
    }

    /// Detect the format from the first bytes of a file.
    pub fn detect(header: &[u8]) -> Option<Self> {
        match header {
            [0x7f, b'E', b'L', b'F', ..] => Some(BinaryFormat::Elf),
            [b'M', b'Z', ..] => Some(BinaryFormat::Pe),
            [0xfe, 0xed, 0xfa, 0xce | 0xcf, ..]
            | [0xce | 0xcf, 0xfa, 0xed, 0xfe, ..]
            | [0xca, 0xfe, 0xba, 0xbe, ..] => Some(BinaryFormat::MachO),
            [b'#', b'!', ..] => Some(BinaryFormat::Script),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryFormat::Elf => "ELF",
            BinaryFormat::Pe => "PE",
            BinaryFormat::MachO => "Mach-O",
            BinaryFormat::Script => "script",
        };
        f.write_str(s)
    }
}

/// Result of probing a build artifact. Purely advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionReport {
    pub exists: bool,
    pub size: Option<u64>,
    pub format: Option<BinaryFormat>,
    pub expected_format: BinaryFormat,
    /// Other files under the output directory with the expected name.
    pub candidates: Vec<PathBuf>,
    pub problems: Vec<String>,
}

impl InspectionReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// The binary the build step is expected to produce.
///
/// Created once after the build and never mutated; inspection results are
/// attached by building a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub binary_name: String,
    pub exists: bool,
    pub inspection: Option<InspectionReport>,
}

impl BuildArtifact {
    /// Describe the artifact at `<output_dir>/bin/<binary_name><suffix>`.
    pub fn locate(output_dir: &Path, binary_name: &str, platform: Platform) -> Self {
        let path = output_dir
            .join("bin")
            .join(format!("{}{}", binary_name, platform.exe_suffix()));
        let exists = path.is_file();
        BuildArtifact {
            path,
            binary_name: binary_name.to_string(),
            exists,
            inspection: None,
        }
    }

    /// A copy of this artifact carrying an inspection report.
    pub fn with_inspection(&self, report: InspectionReport) -> Self {
        BuildArtifact {
            inspection: Some(report),
            ..self.clone()
        }
    }
}

/// Backend script delivered next to the binary plus its runtime dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendBundle {
    pub script_path: PathBuf,
    pub dependency: String,
    pub installed: bool,
}

/// A generated smoke test script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeScript {
    pub url: String,
    pub sentinel: String,
    #[serde(skip)]
    pub contents: String,
    /// SHA-256 of `contents`.
    pub digest: String,
    pub path: Option<PathBuf>,
}
