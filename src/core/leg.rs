//! Matrix legs: one platform/compiler combination.
//!
//! A leg is immutable once enumerated. Everything a leg needs at runtime
//! (search paths, environment, output directory) is derived from it and
//! owned by that leg alone.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system a leg targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    /// All supported platforms, in matrix order.
    pub const ALL: [Platform; 2] = [Platform::Linux, Platform::Windows];

    /// The platform of the machine running quay, if it is one we support.
    pub fn host() -> Option<Platform> {
        match std::env::consts::OS {
            "linux" => Some(Platform::Linux),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }

    /// Package source used to provision legs on this platform.
    pub fn package_source(&self) -> PackageSource {
        match self {
            Platform::Linux => PackageSource::System,
            Platform::Windows => PackageSource::Msys,
        }
    }

    /// Executable suffix for binaries built on this platform.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Platform::Linux => "",
            Platform::Windows => ".exe",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = LegParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "windows" | "win" | "msys" => Ok(Platform::Windows),
            _ => Err(LegParseError(format!(
                "unknown platform '{}', valid values: linux, windows",
                s
            ))),
        }
    }
}

/// Compiler family; determines the CC/CXX pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    Gcc,
    Clang,
}

impl CompilerFamily {
    /// All supported compiler families, in matrix order.
    pub const ALL: [CompilerFamily; 2] = [CompilerFamily::Gcc, CompilerFamily::Clang];

    /// The CC/CXX pair for this family.
    pub fn pair(&self) -> CompilerPair {
        match self {
            CompilerFamily::Gcc => CompilerPair::new("gcc", "g++"),
            CompilerFamily::Clang => CompilerPair::new("clang", "clang++"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompilerFamily {
    type Err = LegParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcc" | "gnu" => Ok(CompilerFamily::Gcc),
            "clang" | "llvm" => Ok(CompilerFamily::Clang),
            _ => Err(LegParseError(format!(
                "unknown compiler '{}', valid values: gcc, clang",
                s
            ))),
        }
    }
}

/// The C and C++ compiler identifiers exported as `CC` and `CXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerPair {
    pub cc: String,
    pub cxx: String,
}

impl CompilerPair {
    pub fn new(cc: impl Into<String>, cxx: impl Into<String>) -> Self {
        CompilerPair {
            cc: cc.into(),
            cxx: cxx.into(),
        }
    }
}

/// Where a leg's toolchain packages come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageSource {
    /// The host system package manager (apt).
    System,
    /// The MSYS2 package manager (pacman).
    Msys,
}

impl PackageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageSource::System => "system-package-manager",
            PackageSource::Msys => "msys-package-manager",
        }
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One platform/compiler combination, executed as an isolated unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixLeg {
    pub platform: Platform,
    pub compiler: CompilerFamily,
    pub compilers: CompilerPair,
    pub package_source: PackageSource,
}

impl MatrixLeg {
    /// Create the leg for a platform and compiler family.
    pub fn new(platform: Platform, compiler: CompilerFamily) -> Self {
        MatrixLeg {
            platform,
            compiler,
            compilers: compiler.pair(),
            package_source: platform.package_source(),
        }
    }

    /// Stable identifier, e.g. `linux-gcc`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.platform, self.compiler)
    }

    /// Whether this leg can execute on the current host.
    pub fn runs_on_host(&self) -> bool {
        Platform::host() == Some(self.platform)
    }
}

impl fmt::Display for MatrixLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (CC={}, CXX={}, {})",
            self.id(),
            self.compilers.cc,
            self.compilers.cxx,
            self.package_source
        )
    }
}

impl std::str::FromStr for MatrixLeg {
    type Err = LegParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, compiler) = s.split_once('-').ok_or_else(|| {
            LegParseError(format!(
                "invalid leg id '{}', expected <platform>-<compiler> (e.g. linux-gcc)",
                s
            ))
        })?;
        Ok(MatrixLeg::new(platform.parse()?, compiler.parse()?))
    }
}

/// Enumerate the cross product of platforms and compilers.
///
/// Order is platform-major and follows the order of the inputs; duplicates
/// are dropped.
pub fn enumerate(platforms: &[Platform], compilers: &[CompilerFamily]) -> Vec<MatrixLeg> {
    let mut legs: Vec<MatrixLeg> = Vec::new();
    for platform in platforms {
        for compiler in compilers {
            let leg = MatrixLeg::new(*platform, *compiler);
            if !legs.contains(&leg) {
                legs.push(leg);
            }
        }
    }
    legs
}

/// Error parsing a platform, compiler, or leg id.
#[derive(Debug, Clone)]
pub struct LegParseError(pub String);

impl fmt::Display for LegParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LegParseError {}
