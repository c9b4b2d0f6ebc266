//! Domain value objects representing immutable concepts

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::errors::DomainError;

/// Vulnerability severity, declared most severe first so the derived order is
/// the rank order: sorting ascending yields the most severe entries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Negligible,
    Unknown,
}

impl Severity {
    /// Ordinal rank. Lower rank means more severe (Critical = 0, Unknown = 5).
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// All severities in rank order, most severe first.
    pub fn all() -> [Severity; 6] {
        [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Negligible,
            Severity::Unknown,
        ]
    }

    /// Parse a free-text severity label. Total: unrecognized input resolves to
    /// `Unknown` instead of failing.
    pub fn from_label(label: &str) -> Severity {
        match label.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            "negligible" | "none" => Severity::Negligible,
            _ => Severity::Unknown,
        }
    }

    /// Strictly lower rank, i.e. `Critical.is_more_severe_than(High)`.
    pub fn is_more_severe_than(&self, other: Severity) -> bool {
        self.rank() < other.rank()
    }

    /// At least as severe as `minimum`.
    pub fn at_least(&self, minimum: Severity) -> bool {
        self.rank() <= minimum.rank()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Negligible => write!(f, "Negligible"),
            Severity::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Package classification as reported by the scanning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Os,
    Python,
    Java,
    Javascript,
    Golang,
    Ruby,
    Php,
    Rust,
    Unknown,
}

impl PackageType {
    /// All package types the scanner distinguishes.
    pub fn all() -> Vec<PackageType> {
        vec![
            PackageType::Os,
            PackageType::Python,
            PackageType::Java,
            PackageType::Javascript,
            PackageType::Golang,
            PackageType::Ruby,
            PackageType::Php,
            PackageType::Rust,
        ]
    }

    /// Canonical lowercase name for this package type.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            PackageType::Os => "os",
            PackageType::Python => "python",
            PackageType::Java => "java",
            PackageType::Javascript => "javascript",
            PackageType::Golang => "golang",
            PackageType::Ruby => "ruby",
            PackageType::Php => "php",
            PackageType::Rust => "rust",
            PackageType::Unknown => "unknown",
        }
    }

    /// Parse a free-text type label. Total: unrecognized input resolves to
    /// `Unknown` instead of failing.
    pub fn from_label(label: &str) -> PackageType {
        match label.trim().to_lowercase().as_str() {
            "os" | "os-package" | "distro" => PackageType::Os,
            "python" | "pypi" => PackageType::Python,
            "java" | "maven" => PackageType::Java,
            "javascript" | "js" | "npm" | "node" => PackageType::Javascript,
            "golang" | "go" => PackageType::Golang,
            "ruby" | "gem" | "rubygems" => PackageType::Ruby,
            "php" | "composer" => PackageType::Php,
            "rust" | "cargo" => PackageType::Rust,
            _ => PackageType::Unknown,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

/// Outcome of a policy, bundle or rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationResult {
    Passed,
    Failed,
}

impl EvaluationResult {
    /// Parse a free-text evaluation label. Total: only an explicit failure
    /// signal gates, everything else resolves to `Passed`.
    pub fn from_label(label: &str) -> EvaluationResult {
        if label.trim().to_lowercase().contains("fail") {
            EvaluationResult::Failed
        } else {
            EvaluationResult::Passed
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EvaluationResult::Failed)
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationResult::Passed => write!(f, "passed"),
            EvaluationResult::Failed => write!(f, "failed"),
        }
    }
}

/// Semantic version, a newtype over `semver::Version` with domain behavior:
/// a leading `v` marker is stripped, incomplete versions are padded, and build
/// metadata is ignored for equality and ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(#[serde(with = "version_serde")] pub semver::Version);

impl Version {
    /// Parse a version string into a `Version`.
    pub fn parse(version: &str) -> Result<Self, DomainError> {
        let version = version.trim();

        if version.is_empty() {
            return Err(DomainError::InvalidVersion {
                version: version.to_string(),
            });
        }

        // Strip the leading marker common in git tags and scanner output
        let clean = version
            .strip_prefix('v')
            .or_else(|| version.strip_prefix('V'))
            .unwrap_or(version);

        // Pad incomplete versions ("1" -> "1.0.0", "1.2" -> "1.2.0")
        let normalized = match clean.matches('.').count() {
            0 => format!("{}.0.0", clean),
            1 => format!("{}.0", clean),
            _ => clean.to_string(),
        };

        semver::Version::parse(&normalized)
            .map(Version)
            .map_err(|_| DomainError::InvalidVersion {
                version: version.to_string(),
            })
    }

    /// Create a version from its numeric triple.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version(semver::Version::new(major, minor, patch))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Pre-release identifiers, if any.
    pub fn pre_release(&self) -> Option<String> {
        if self.0.pre.is_empty() {
            None
        } else {
            Some(self.0.pre.to_string())
        }
    }
}

// Precedence comparison per the semver spec: the numeric triple, then
// pre-release identifiers (presence sorts below absence), build metadata ignored.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_precedence(&other.0) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_precedence(&other.0)
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.major.hash(state);
        self.0.minor.hash(state);
        self.0.patch.hash(state);
        self.0.pre.as_str().hash(state);
    }
}

impl FromStr for Version {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Custom serde handling that keeps the string form on the wire.
mod version_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(version: &semver::Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        version.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<semver::Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::Version::parse(&s)
            .map(|v| v.0)
            .map_err(serde::de::Error::custom)
    }
}

/// Strongly-typed vulnerability identifier (CVE or other advisory id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VulnerabilityId(String);

impl VulnerabilityId {
    /// Create a new `VulnerabilityId` with validation.
    pub fn new(id: String) -> Result<Self, DomainError> {
        let id = id.trim().to_string();
        if id.is_empty() || id.len() > 100 {
            return Err(DomainError::InvalidVulnerabilityId { id });
        }
        Ok(VulnerabilityId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cve(&self) -> bool {
        self.0.starts_with("CVE-")
    }
}

impl fmt::Display for VulnerabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VulnerabilityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}
