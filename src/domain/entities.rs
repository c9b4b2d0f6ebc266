//! Domain entities representing core business concepts
//!
//! The aggregate root is [`ScanResult`]: it owns the canonical instance of every
//! layer, vulnerability, accepted risk, package and policy, keyed by identifier.
//! All other entities hold identifiers, not instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::errors::DomainError;
use super::value_objects::*;

/// Scan-level metadata carried by the aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Pull string or file path the scanner was pointed at.
    pub target: String,
    pub scan_time: DateTime<Utc>,
    pub scanner_version: String,
    pub image_id: Option<String>,
    pub digest: Option<String>,
    pub os: Option<String>,
    pub size_bytes: Option<u64>,
    pub result_url: Option<String>,
}

impl ScanMetadata {
    pub fn new(target: String, scan_time: DateTime<Utc>, scanner_version: String) -> Self {
        Self {
            target,
            scan_time,
            scanner_version,
            image_id: None,
            digest: None,
            os: None,
            size_bytes: None,
            result_url: None,
        }
    }
}

/// A single image layer. Packages reference their owning layer by digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub digest: String,
    pub index: Option<u32>,
    pub command: Option<String>,
    pub size_bytes: Option<u64>,
}

impl Layer {
    pub fn new(digest: String) -> Self {
        Self {
            digest,
            index: None,
            command: None,
            size_bytes: None,
        }
    }
}

/// A detected vulnerability, keyed by its CVE/advisory id.
///
/// Holds weak back-references to the accepted risks that suppress it; the
/// aggregate root owns the canonical [`AcceptedRisk`] instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve: VulnerabilityId,
    pub severity: Severity,
    pub cvss_score: f64,
    pub disclosure_date: Option<DateTime<Utc>>,
    pub exploitable: bool,
    pub fix_versions: Vec<Version>,
    pub accepted_risk_ids: Vec<String>,
}

impl Vulnerability {
    pub fn new(cve: VulnerabilityId, severity: Severity, cvss_score: f64) -> Self {
        Self {
            cve,
            severity,
            cvss_score,
            disclosure_date: None,
            exploitable: false,
            fix_versions: Vec::new(),
            accepted_risk_ids: Vec::new(),
        }
    }

    pub fn has_fix(&self) -> bool {
        !self.fix_versions.is_empty()
    }

    /// Record an accepted-risk association. Idempotent: linking an already
    /// linked risk is a no-op. Returns whether a new link was inserted.
    pub fn link_accepted_risk(&mut self, risk_id: &str) -> bool {
        if self.accepted_risk_ids.iter().any(|id| id == risk_id) {
            return false;
        }
        self.accepted_risk_ids.push(risk_id.to_string());
        true
    }
}

/// One vulnerability/package pair an accepted risk applies to. A context
/// matches when every field it specifies matches; a context that specifies
/// nothing matches nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
    pub vulnerability_id: Option<String>,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
}

impl RiskContext {
    fn is_empty(&self) -> bool {
        self.vulnerability_id.is_none()
            && self.package_name.is_none()
            && self.package_version.is_none()
    }

    fn matches(&self, cve: &str, package: &Package) -> bool {
        if self.is_empty() {
            return false;
        }
        self.vulnerability_id.as_deref().map_or(true, |v| v == cve)
            && self
                .package_name
                .as_deref()
                .map_or(true, |n| n == package.name)
            && self
                .package_version
                .as_deref()
                .map_or(true, |v| v == package.version.to_string())
    }
}

/// An explicit suppression record for acknowledged vulnerabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedRisk {
    pub id: String,
    pub reason: String,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub contexts: Vec<RiskContext>,
}

impl AcceptedRisk {
    pub fn new(id: String, reason: String) -> Self {
        Self {
            id,
            reason,
            description: None,
            expires_at: None,
            active: true,
            contexts: Vec::new(),
        }
    }

    /// Whether the risk is applicable at the given instant.
    pub fn is_in_effect(&self, at: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| expiry > at)
    }

    /// Whether this risk suppresses the given vulnerability on the given
    /// package at the given instant.
    pub fn covers(&self, cve: &str, package: &Package, at: DateTime<Utc>) -> bool {
        self.is_in_effect(at) && self.contexts.iter().any(|c| c.matches(cve, package))
    }

    pub fn targets_vulnerability(&self, cve: &str) -> bool {
        self.contexts
            .iter()
            .any(|c| c.vulnerability_id.as_deref() == Some(cve))
    }

    pub fn targets_package(&self, package_name: &str) -> bool {
        self.contexts
            .iter()
            .any(|c| c.package_name.as_deref() == Some(package_name))
    }

    /// Record that this risk targets a vulnerability. Idempotent.
    pub fn link_vulnerability(&mut self, cve: &str) -> bool {
        if self.targets_vulnerability(cve) {
            return false;
        }
        self.contexts.push(RiskContext {
            vulnerability_id: Some(cve.to_string()),
            package_name: None,
            package_version: None,
        });
        true
    }

    /// Record that this risk targets a package. Idempotent.
    pub fn link_package(&mut self, package_name: &str) -> bool {
        if self.targets_package(package_name) {
            return false;
        }
        self.contexts.push(RiskContext {
            vulnerability_id: None,
            package_name: Some(package_name.to_string()),
            package_version: None,
        });
        true
    }
}

/// An installed package and its association sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub package_type: PackageType,
    pub version: Version,
    /// File location inside the image, when the scanner reports one.
    pub path: Option<String>,
    /// Owning layer reference.
    pub layer_digest: Option<String>,
    pub vulnerability_ids: Vec<VulnerabilityId>,
    pub accepted_risk_ids: Vec<String>,
}

impl Package {
    pub fn new(
        name: String,
        package_type: PackageType,
        version: Version,
    ) -> Result<Self, DomainError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::InvalidInput {
                field: "name".to_string(),
                message: "package name cannot be empty".to_string(),
            });
        }
        Ok(Self {
            name,
            package_type,
            version,
            path: None,
            layer_digest: None,
            vulnerability_ids: Vec::new(),
            accepted_risk_ids: Vec::new(),
        })
    }

    /// Dedup key inside the aggregate.
    pub fn identifier(&self) -> String {
        format!(
            "{}:{}@{}",
            self.package_type.canonical_name(),
            self.name,
            self.version
        )
    }

    /// Record an affecting vulnerability. Idempotent.
    pub fn link_vulnerability(&mut self, cve: &VulnerabilityId) -> bool {
        if self.vulnerability_ids.contains(cve) {
            return false;
        }
        self.vulnerability_ids.push(cve.clone());
        true
    }

    /// Record a covering accepted risk. Idempotent.
    pub fn link_accepted_risk(&mut self, risk_id: &str) -> bool {
        if self.accepted_risk_ids.iter().any(|id| id == risk_id) {
            return false;
        }
        self.accepted_risk_ids.push(risk_id.to_string());
        true
    }

    /// The most severe severity among the package's resolvable
    /// vulnerabilities; `Unknown` when none resolve.
    pub fn highest_severity(&self, vulnerabilities: &HashMap<String, Vulnerability>) -> Severity {
        self.vulnerability_ids
            .iter()
            .filter_map(|id| vulnerabilities.get(id.as_str()))
            .map(|v| v.severity)
            .min()
            .unwrap_or(Severity::Unknown)
    }

    /// The fix version remediating the most vulnerabilities, weighted by
    /// severity: candidates are compared by their per-severity remediation
    /// counts (Critical first), ties broken by preferring the later version.
    /// `None` when no vulnerability on the package offers a fix.
    pub fn suggested_fix_version(
        &self,
        vulnerabilities: &HashMap<String, Vulnerability>,
    ) -> Option<Version> {
        let vulns: Vec<&Vulnerability> = self
            .vulnerability_ids
            .iter()
            .filter_map(|id| vulnerabilities.get(id.as_str()))
            .collect();

        let mut candidates: Vec<Version> = Vec::new();
        for vuln in &vulns {
            for fix in &vuln.fix_versions {
                if !candidates.contains(fix) {
                    candidates.push(fix.clone());
                }
            }
        }

        candidates.into_iter().max_by(|a, b| {
            Self::remediation_counts(a, &vulns)
                .cmp(&Self::remediation_counts(b, &vulns))
                .then_with(|| a.cmp(b))
        })
    }

    /// Vulnerabilities the candidate remediates, counted per severity rank
    /// with Critical at index 0 so array comparison is severity-lexicographic.
    fn remediation_counts(candidate: &Version, vulns: &[&Vulnerability]) -> [usize; 6] {
        let mut counts = [0usize; 6];
        for vuln in vulns {
            if vuln.fix_versions.contains(candidate) {
                counts[vuln.severity.rank() as usize] += 1;
            }
        }
        counts
    }
}

/// A description of one condition that made a rule fail, with validated
/// references into the aggregate where the failure names entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub description: String,
    pub package_ref: Option<String>,
    pub vulnerability_ref: Option<String>,
}

/// The two rule variants the policy engine reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyRuleKind {
    PackageVulnerability {
        severity_threshold: Severity,
        cvss_threshold: Option<f64>,
        failures: Vec<RuleFailure>,
    },
    ImageConfiguration {
        check: String,
        remediation: Option<String>,
    },
}

/// One policy rule with its own evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyBundleRule {
    pub id: String,
    pub kind: PolicyRuleKind,
    pub evaluation: EvaluationResult,
}

/// A named group of rules. Failed if any contained rule is failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyBundle {
    pub id: String,
    pub name: String,
    pub rules: Vec<PolicyBundleRule>,
}

impl PolicyBundle {
    pub fn evaluation_result(&self) -> EvaluationResult {
        if self.rules.iter().any(|rule| rule.evaluation.is_failed()) {
            EvaluationResult::Failed
        } else {
            EvaluationResult::Passed
        }
    }
}

/// A named group of bundles. Failed if any contained bundle is failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub bundles: Vec<PolicyBundle>,
}

impl Policy {
    pub fn evaluation_result(&self) -> EvaluationResult {
        if self
            .bundles
            .iter()
            .any(|bundle| bundle.evaluation_result().is_failed())
        {
            EvaluationResult::Failed
        } else {
            EvaluationResult::Passed
        }
    }
}

/// Distinct-vulnerability counts per severity level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub negligible: usize,
    pub unknown: usize,
}

impl SeverityBreakdown {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Negligible => self.negligible += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Negligible => self.negligible,
            Severity::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        Severity::all().iter().map(|s| self.count(*s)).sum()
    }

    /// The most severe level with a non-zero count.
    pub fn highest_severity(&self) -> Option<Severity> {
        Severity::all().into_iter().find(|s| self.count(*s) > 0)
    }
}

/// The aggregate root for one scan invocation.
///
/// Every entity collection is a keyed index, so insertion is an upsert by
/// identifier: re-adding an entity with a present key merges into the existing
/// instance instead of creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub metadata: ScanMetadata,
    layers: HashMap<String, Layer>,
    vulnerabilities: HashMap<String, Vulnerability>,
    accepted_risks: HashMap<String, AcceptedRisk>,
    packages: HashMap<String, Package>,
    policies: HashMap<String, Policy>,
}

impl ScanResult {
    pub fn new(metadata: ScanMetadata) -> Self {
        Self {
            metadata,
            layers: HashMap::new(),
            vulnerabilities: HashMap::new(),
            accepted_risks: HashMap::new(),
            packages: HashMap::new(),
            policies: HashMap::new(),
        }
    }

    pub fn layers(&self) -> &HashMap<String, Layer> {
        &self.layers
    }

    pub fn vulnerabilities(&self) -> &HashMap<String, Vulnerability> {
        &self.vulnerabilities
    }

    pub fn accepted_risks(&self) -> &HashMap<String, AcceptedRisk> {
        &self.accepted_risks
    }

    pub fn packages(&self) -> &HashMap<String, Package> {
        &self.packages
    }

    pub fn policies(&self) -> &HashMap<String, Policy> {
        &self.policies
    }

    pub fn layer(&self, digest: &str) -> Option<&Layer> {
        self.layers.get(digest)
    }

    pub fn vulnerability(&self, cve: &str) -> Option<&Vulnerability> {
        self.vulnerabilities.get(cve)
    }

    pub fn accepted_risk(&self, id: &str) -> Option<&AcceptedRisk> {
        self.accepted_risks.get(id)
    }

    pub fn package(&self, identifier: &str) -> Option<&Package> {
        self.packages.get(identifier)
    }

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.insert(layer.digest.clone(), layer);
    }

    /// Insert or merge by CVE id. Merging unions the reference lists, keeps
    /// the more severe severity and the higher CVSS, and fills fields the
    /// existing instance was missing.
    pub fn add_vulnerability(&mut self, vulnerability: Vulnerability) {
        match self.vulnerabilities.get_mut(vulnerability.cve.as_str()) {
            Some(existing) => {
                if vulnerability.severity.is_more_severe_than(existing.severity) {
                    existing.severity = vulnerability.severity;
                }
                if vulnerability.cvss_score > existing.cvss_score {
                    existing.cvss_score = vulnerability.cvss_score;
                }
                existing.exploitable |= vulnerability.exploitable;
                if existing.disclosure_date.is_none() {
                    existing.disclosure_date = vulnerability.disclosure_date;
                }
                for fix in vulnerability.fix_versions {
                    if !existing.fix_versions.contains(&fix) {
                        existing.fix_versions.push(fix);
                    }
                }
                for risk_id in vulnerability.accepted_risk_ids {
                    existing.link_accepted_risk(&risk_id);
                }
            }
            None => {
                self.vulnerabilities
                    .insert(vulnerability.cve.as_str().to_string(), vulnerability);
            }
        }
    }

    /// Insert or merge by risk id. Merging unions contexts and fills missing
    /// optional fields.
    pub fn add_accepted_risk(&mut self, risk: AcceptedRisk) {
        match self.accepted_risks.get_mut(&risk.id) {
            Some(existing) => {
                if existing.description.is_none() {
                    existing.description = risk.description;
                }
                if existing.expires_at.is_none() {
                    existing.expires_at = risk.expires_at;
                }
                for context in risk.contexts {
                    if !existing.contexts.contains(&context) {
                        existing.contexts.push(context);
                    }
                }
            }
            None => {
                self.accepted_risks.insert(risk.id.clone(), risk);
            }
        }
    }

    /// Insert or merge by package identifier. Merging unions the reference
    /// lists and fills a missing path or layer reference.
    pub fn add_package(&mut self, package: Package) {
        let key = package.identifier();
        match self.packages.get_mut(&key) {
            Some(existing) => {
                if existing.path.is_none() {
                    existing.path = package.path;
                }
                if existing.layer_digest.is_none() {
                    existing.layer_digest = package.layer_digest;
                }
                for cve in package.vulnerability_ids {
                    existing.link_vulnerability(&cve);
                }
                for risk_id in package.accepted_risk_ids {
                    existing.link_accepted_risk(&risk_id);
                }
            }
            None => {
                self.packages.insert(key, package);
            }
        }
    }

    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.insert(policy.id.clone(), policy);
    }

    /// Establish the vulnerability/risk association on both sides. No-op when
    /// either endpoint is missing from the aggregate.
    pub fn link_vulnerability_to_risk(&mut self, cve: &str, risk_id: &str) {
        if !self.accepted_risks.contains_key(risk_id) {
            warn!(risk_id, "dropping link to unknown accepted risk");
            return;
        }
        let Some(vulnerability) = self.vulnerabilities.get_mut(cve) else {
            warn!(cve, "dropping risk link to unknown vulnerability");
            return;
        };
        vulnerability.link_accepted_risk(risk_id);
        if let Some(risk) = self.accepted_risks.get_mut(risk_id) {
            risk.link_vulnerability(cve);
        }
    }

    /// Associate a package with an affecting vulnerability. No-op when either
    /// endpoint is missing from the aggregate.
    pub fn link_package_to_vulnerability(&mut self, package_id: &str, cve: &str) {
        let Some(vulnerability) = self.vulnerabilities.get(cve) else {
            warn!(cve, "dropping package link to unknown vulnerability");
            return;
        };
        let cve = vulnerability.cve.clone();
        let Some(package) = self.packages.get_mut(package_id) else {
            warn!(package_id, "dropping vulnerability link to unknown package");
            return;
        };
        package.link_vulnerability(&cve);
    }

    /// Establish the package/risk association on both sides. No-op when
    /// either endpoint is missing from the aggregate.
    pub fn link_package_to_risk(&mut self, package_id: &str, risk_id: &str) {
        let Some(package) = self.packages.get_mut(package_id) else {
            warn!(package_id, "dropping risk link to unknown package");
            return;
        };
        let Some(risk) = self.accepted_risks.get_mut(risk_id) else {
            warn!(risk_id, "dropping package link to unknown accepted risk");
            return;
        };
        package.link_accepted_risk(risk_id);
        risk.link_package(&package.name);
    }

    /// Whether any applicable accepted risk suppresses the vulnerability for
    /// the package, judged at the scan timestamp.
    pub fn accepted_risk_covers(&self, cve: &str, package: &Package) -> bool {
        let at = self.metadata.scan_time;
        let mut risk_ids: Vec<&str> = package
            .accepted_risk_ids
            .iter()
            .map(String::as_str)
            .collect();
        if let Some(vulnerability) = self.vulnerabilities.get(cve) {
            for id in &vulnerability.accepted_risk_ids {
                if !risk_ids.contains(&id.as_str()) {
                    risk_ids.push(id);
                }
            }
        }
        risk_ids
            .into_iter()
            .filter_map(|id| self.accepted_risks.get(id))
            .any(|risk| risk.covers(cve, package, at))
    }

    /// OR-of-failures over all owned policies; vacuously passed when the scan
    /// carries no policies.
    pub fn evaluation_result(&self) -> EvaluationResult {
        if self
            .policies
            .values()
            .any(|policy| policy.evaluation_result().is_failed())
        {
            EvaluationResult::Failed
        } else {
            EvaluationResult::Passed
        }
    }

    pub fn suggested_fix_version(&self, package: &Package) -> Option<Version> {
        package.suggested_fix_version(&self.vulnerabilities)
    }

    /// Distinct-CVE severity counts across the given packages.
    pub fn severity_breakdown(&self, packages: &[Package]) -> SeverityBreakdown {
        let mut breakdown = SeverityBreakdown::default();
        let mut seen: HashSet<&str> = HashSet::new();
        for package in packages {
            for cve in &package.vulnerability_ids {
                if let Some(vulnerability) = self.vulnerabilities.get(cve.as_str()) {
                    if seen.insert(vulnerability.cve.as_str()) {
                        breakdown.record(vulnerability.severity);
                    }
                }
            }
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metadata() -> ScanMetadata {
        ScanMetadata::new(
            "registry.example.com/app:1.0".to_string(),
            "2024-03-01T12:00:00Z".parse().unwrap(),
            "5.1.0".to_string(),
        )
    }

    fn test_vulnerability(cve: &str, severity: Severity) -> Vulnerability {
        Vulnerability::new(
            VulnerabilityId::new(cve.to_string()).unwrap(),
            severity,
            7.5,
        )
    }

    fn test_package(name: &str) -> Package {
        Package::new(
            name.to_string(),
            PackageType::Os,
            Version::parse("1.2.3").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_package_identifier() {
        let package = test_package("openssl");
        assert_eq!(package.identifier(), "os:openssl@1.2.3");
    }

    #[test]
    fn test_package_validation() {
        assert!(Package::new(
            "  ".to_string(),
            PackageType::Os,
            Version::parse("1.0.0").unwrap()
        )
        .is_err());
    }

    #[test]
    fn test_vulnerability_upsert_is_deduplicating() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::Low));
        scan.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::Critical));

        assert_eq!(scan.vulnerabilities().len(), 1);
        // Merge kept the more severe severity
        assert_eq!(
            scan.vulnerability("CVE-2024-0001").unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_package_upsert_merges_references() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::High));
        scan.add_vulnerability(test_vulnerability("CVE-2024-0002", Severity::Low));

        let mut first = test_package("openssl");
        first.vulnerability_ids = vec![VulnerabilityId::new("CVE-2024-0001".into()).unwrap()];
        let mut second = test_package("openssl");
        second.vulnerability_ids = vec![
            VulnerabilityId::new("CVE-2024-0001".into()).unwrap(),
            VulnerabilityId::new("CVE-2024-0002".into()).unwrap(),
        ];
        scan.add_package(first);
        scan.add_package(second);

        assert_eq!(scan.packages().len(), 1);
        let merged = scan.package("os:openssl@1.2.3").unwrap();
        assert_eq!(merged.vulnerability_ids.len(), 2);
    }

    #[test]
    fn test_link_package_to_risk_is_idempotent() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_accepted_risk(AcceptedRisk::new("risk-1".into(), "false positive".into()));
        scan.add_package(test_package("openssl"));

        scan.link_package_to_risk("os:openssl@1.2.3", "risk-1");
        scan.link_package_to_risk("os:openssl@1.2.3", "risk-1");

        let package = scan.package("os:openssl@1.2.3").unwrap();
        assert_eq!(package.accepted_risk_ids.len(), 1);
        let risk = scan.accepted_risk("risk-1").unwrap();
        assert_eq!(
            risk.contexts
                .iter()
                .filter(|c| c.package_name.as_deref() == Some("openssl"))
                .count(),
            1
        );
    }

    #[test]
    fn test_link_to_missing_entity_is_noop() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_package(test_package("openssl"));

        scan.link_package_to_vulnerability("os:openssl@1.2.3", "CVE-2099-9999");
        assert!(scan
            .package("os:openssl@1.2.3")
            .unwrap()
            .vulnerability_ids
            .is_empty());
    }

    #[test]
    fn test_suggested_fix_critical_count_dominates() {
        let mut vulnerabilities = HashMap::new();
        let mut critical = test_vulnerability("CVE-2024-0001", Severity::Critical);
        critical.fix_versions = vec![Version::parse("2.0.0").unwrap()];
        vulnerabilities.insert("CVE-2024-0001".to_string(), critical);
        for (i, cve) in ["CVE-2024-0002", "CVE-2024-0003"].iter().enumerate() {
            let mut high = test_vulnerability(cve, Severity::High);
            high.fix_versions = vec![Version::parse("1.5.0").unwrap()];
            vulnerabilities.insert(format!("CVE-2024-000{}", i + 2), high);
        }

        let mut package = test_package("libfoo");
        package.vulnerability_ids = vulnerabilities
            .keys()
            .map(|k| VulnerabilityId::new(k.clone()).unwrap())
            .collect();

        // One Critical fix outweighs two High fixes
        assert_eq!(
            package.suggested_fix_version(&vulnerabilities),
            Some(Version::parse("2.0.0").unwrap())
        );
    }

    #[test]
    fn test_suggested_fix_tie_prefers_higher_version() {
        let mut vulnerabilities = HashMap::new();
        let mut vuln = test_vulnerability("CVE-2024-0001", Severity::High);
        vuln.fix_versions = vec![
            Version::parse("1.5.0").unwrap(),
            Version::parse("2.0.0").unwrap(),
        ];
        vulnerabilities.insert("CVE-2024-0001".to_string(), vuln);

        let mut package = test_package("libfoo");
        package.vulnerability_ids = vec![VulnerabilityId::new("CVE-2024-0001".into()).unwrap()];

        assert_eq!(
            package.suggested_fix_version(&vulnerabilities),
            Some(Version::parse("2.0.0").unwrap())
        );
    }

    #[test]
    fn test_suggested_fix_none_when_no_fix_offered() {
        let mut vulnerabilities = HashMap::new();
        vulnerabilities.insert(
            "CVE-2024-0001".to_string(),
            test_vulnerability("CVE-2024-0001", Severity::High),
        );

        let mut package = test_package("libfoo");
        package.vulnerability_ids = vec![VulnerabilityId::new("CVE-2024-0001".into()).unwrap()];

        assert_eq!(package.suggested_fix_version(&vulnerabilities), None);
    }

    #[test]
    fn test_policy_evaluation_or_of_failures() {
        let failed_rule = PolicyBundleRule {
            id: "rule-1".into(),
            kind: PolicyRuleKind::ImageConfiguration {
                check: "user must not be root".into(),
                remediation: None,
            },
            evaluation: EvaluationResult::Failed,
        };
        let passed_rule = PolicyBundleRule {
            id: "rule-2".into(),
            kind: PolicyRuleKind::PackageVulnerability {
                severity_threshold: Severity::High,
                cvss_threshold: None,
                failures: Vec::new(),
            },
            evaluation: EvaluationResult::Passed,
        };

        let failing_bundle = PolicyBundle {
            id: "bundle-1".into(),
            name: "baseline".into(),
            rules: vec![passed_rule.clone(), failed_rule],
        };
        assert!(failing_bundle.evaluation_result().is_failed());

        let passing_bundle = PolicyBundle {
            id: "bundle-2".into(),
            name: "extras".into(),
            rules: vec![passed_rule],
        };
        assert!(!passing_bundle.evaluation_result().is_failed());

        let policy = Policy {
            id: "policy-1".into(),
            name: "default".into(),
            bundles: vec![passing_bundle.clone(), failing_bundle],
        };
        assert!(policy.evaluation_result().is_failed());

        // Zero bundles is a vacuous pass
        let empty = Policy {
            id: "policy-2".into(),
            name: "empty".into(),
            bundles: Vec::new(),
        };
        assert_eq!(empty.evaluation_result(), EvaluationResult::Passed);

        let mut scan = ScanResult::new(test_metadata());
        assert_eq!(scan.evaluation_result(), EvaluationResult::Passed);
        scan.add_policy(policy);
        assert_eq!(scan.evaluation_result(), EvaluationResult::Failed);
    }

    #[test]
    fn test_accepted_risk_coverage_and_expiry() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::High));

        let mut risk = AcceptedRisk::new("risk-1".into(), "accepted".into());
        risk.contexts.push(RiskContext {
            vulnerability_id: Some("CVE-2024-0001".into()),
            package_name: Some("openssl".into()),
            package_version: None,
        });
        scan.add_accepted_risk(risk);

        let mut package = test_package("openssl");
        package.vulnerability_ids = vec![VulnerabilityId::new("CVE-2024-0001".into()).unwrap()];
        package.accepted_risk_ids = vec!["risk-1".into()];
        scan.add_package(package);

        let package = scan.package("os:openssl@1.2.3").unwrap().clone();
        assert!(scan.accepted_risk_covers("CVE-2024-0001", &package));

        // An expired risk covers nothing
        let mut expired = scan.accepted_risk("risk-1").unwrap().clone();
        expired.expires_at = Some("2023-01-01T00:00:00Z".parse().unwrap());
        let mut scan2 = ScanResult::new(test_metadata());
        scan2.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::High));
        scan2.add_accepted_risk(expired);
        scan2.add_package(package.clone());
        assert!(!scan2.accepted_risk_covers("CVE-2024-0001", &package));
    }

    #[test]
    fn test_empty_risk_context_matches_nothing() {
        let context = RiskContext {
            vulnerability_id: None,
            package_name: None,
            package_version: None,
        };
        assert!(!context.matches("CVE-2024-0001", &test_package("openssl")));
    }

    #[test]
    fn test_severity_breakdown_counts_distinct_cves() {
        let mut scan = ScanResult::new(test_metadata());
        scan.add_vulnerability(test_vulnerability("CVE-2024-0001", Severity::Critical));
        scan.add_vulnerability(test_vulnerability("CVE-2024-0002", Severity::Medium));

        let mut a = test_package("libfoo");
        a.vulnerability_ids = vec![
            VulnerabilityId::new("CVE-2024-0001".into()).unwrap(),
            VulnerabilityId::new("CVE-2024-0002".into()).unwrap(),
        ];
        let mut b = test_package("libbar");
        // The same CVE on a second package must not double-count
        b.vulnerability_ids = vec![VulnerabilityId::new("CVE-2024-0001".into()).unwrap()];

        let breakdown = scan.severity_breakdown(&[a, b]);
        assert_eq!(breakdown.critical, 1);
        assert_eq!(breakdown.medium, 1);
        assert_eq!(breakdown.total(), 2);
        assert_eq!(breakdown.highest_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_package_highest_severity() {
        let mut vulnerabilities = HashMap::new();
        vulnerabilities.insert(
            "CVE-2024-0001".to_string(),
            test_vulnerability("CVE-2024-0001", Severity::Medium),
        );
        vulnerabilities.insert(
            "CVE-2024-0002".to_string(),
            test_vulnerability("CVE-2024-0002", Severity::Critical),
        );

        let mut package = test_package("libfoo");
        package.vulnerability_ids = vec![
            VulnerabilityId::new("CVE-2024-0001".into()).unwrap(),
            VulnerabilityId::new("CVE-2024-0002".into()).unwrap(),
        ];
        assert_eq!(
            package.highest_severity(&vulnerabilities),
            Severity::Critical
        );

        let orphan = test_package("empty");
        assert_eq!(orphan.highest_severity(&vulnerabilities), Severity::Unknown);
    }
}
