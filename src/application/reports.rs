//! Report synthesis
//!
//! Projects a filtered aggregate into the two output shapes consumed by
//! downstream presenters: a SARIF-style findings document (grouped by
//! vulnerability or by package) and a structured summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{
    sort_vulnerabilities, EvaluationResult, Package, PackageType, ScanResult, Severity,
    SeverityBreakdown, Version, Vulnerability,
};

const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const SARIF_VERSION: &str = "2.1.0";
const INFORMATION_URI: &str = "https://github.com/scangate/scangate";

/// How findings are grouped into rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    /// One rule per distinct CVE, one result per affected package.
    Vulnerability,
    /// One rule per vulnerable package, one result per vulnerability.
    Package,
}

/// Fixed severity-to-level mapping for findings output.
pub fn severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Negligible | Severity::Unknown => "note",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingsReport {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub tool: Tool,
    pub results: Vec<FindingResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub driver: ToolDriver,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDriver {
    pub name: String,
    pub version: String,
    pub information_uri: String,
    pub rules: Vec<ReportingRule>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingRule {
    pub id: String,
    pub name: String,
    pub short_description: Message,
    pub full_description: Message,
    pub properties: RuleProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleProperties {
    #[serde(rename = "security-severity")]
    pub security_severity: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingResult {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub level: String,
    pub message: Message,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub physical_location: PhysicalLocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalLocation {
    pub artifact_location: ArtifactLocation,
    pub region: Region,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub start_line: usize,
}

impl FindingsReport {
    /// Synthesize the findings document from a filtered, sorted package
    /// sequence. Output ordering follows the input ordering, so the result is
    /// deterministic for a given filtered aggregate.
    pub fn from_scan(scan: &ScanResult, packages: &[Package], grouping: GroupingMode) -> Self {
        let (rules, results) = match grouping {
            GroupingMode::Vulnerability => Self::group_by_vulnerability(scan, packages),
            GroupingMode::Package => Self::group_by_package(scan, packages),
        };
        FindingsReport {
            schema: SARIF_SCHEMA.to_string(),
            version: SARIF_VERSION.to_string(),
            runs: vec![Run {
                tool: Tool {
                    driver: ToolDriver {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        information_uri: INFORMATION_URI.to_string(),
                        rules,
                    },
                },
                results,
            }],
        }
    }

    fn group_by_vulnerability(
        scan: &ScanResult,
        packages: &[Package],
    ) -> (Vec<ReportingRule>, Vec<FindingResult>) {
        // Distinct CVEs across the filtered packages, most severe first
        let mut seen: HashSet<&str> = HashSet::new();
        let mut vulns: Vec<Vulnerability> = Vec::new();
        for package in packages {
            for id in &package.vulnerability_ids {
                if let Some(vulnerability) = scan.vulnerability(id.as_str()) {
                    if seen.insert(vulnerability.cve.as_str()) {
                        vulns.push(vulnerability.clone());
                    }
                }
            }
        }
        let vulns = sort_vulnerabilities(vulns);

        let rules = vulns
            .iter()
            .map(|vulnerability| ReportingRule {
                id: vulnerability.cve.to_string(),
                name: vulnerability.cve.to_string(),
                short_description: Message {
                    text: format!("{} ({})", vulnerability.cve, vulnerability.severity),
                },
                full_description: Message {
                    text: vulnerability_description(vulnerability),
                },
                properties: RuleProperties {
                    security_severity: format!("{:.1}", vulnerability.cvss_score),
                    tags: vec![
                        "security".to_string(),
                        "vulnerability".to_string(),
                        vulnerability.severity.to_string().to_lowercase(),
                    ],
                },
            })
            .collect();

        let mut results = Vec::new();
        for vulnerability in &vulns {
            for package in packages
                .iter()
                .filter(|p| p.vulnerability_ids.contains(&vulnerability.cve))
            {
                results.push(FindingResult {
                    rule_id: vulnerability.cve.to_string(),
                    level: severity_to_level(vulnerability.severity).to_string(),
                    message: Message {
                        text: finding_message(scan, vulnerability, package),
                    },
                    locations: vec![package_location(package)],
                });
            }
        }
        (rules, results)
    }

    fn group_by_package(
        scan: &ScanResult,
        packages: &[Package],
    ) -> (Vec<ReportingRule>, Vec<FindingResult>) {
        let mut rules = Vec::new();
        let mut results = Vec::new();

        for package in packages {
            let vulns: Vec<Vulnerability> = package
                .vulnerability_ids
                .iter()
                .filter_map(|id| scan.vulnerability(id.as_str()))
                .cloned()
                .collect();
            if vulns.is_empty() {
                continue;
            }
            let vulns = sort_vulnerabilities(vulns);

            // Rule severity is the maximum CVSS across the package's vulnerabilities
            let max_cvss = vulns.iter().map(|v| v.cvss_score).fold(0.0, f64::max);
            let suggested = package.suggested_fix_version(scan.vulnerabilities());

            let mut description = format!(
                "{} vulnerabilities found in {} package {}@{}",
                vulns.len(),
                package.package_type,
                package.name,
                package.version
            );
            match &suggested {
                Some(version) => description.push_str(&format!(", suggested fix: {version}")),
                None => description.push_str(", no fix available"),
            }

            rules.push(ReportingRule {
                id: package.identifier(),
                name: format!("{}@{}", package.name, package.version),
                short_description: Message {
                    text: format!("Vulnerable package {}@{}", package.name, package.version),
                },
                full_description: Message { text: description },
                properties: RuleProperties {
                    security_severity: format!("{max_cvss:.1}"),
                    tags: vec![
                        "security".to_string(),
                        "vulnerability".to_string(),
                        package.package_type.to_string(),
                    ],
                },
            });

            for vulnerability in &vulns {
                results.push(FindingResult {
                    rule_id: package.identifier(),
                    level: severity_to_level(vulnerability.severity).to_string(),
                    message: Message {
                        text: finding_message(scan, vulnerability, package),
                    },
                    locations: vec![package_location(package)],
                });
            }
        }
        (rules, results)
    }
}

fn vulnerability_description(vulnerability: &Vulnerability) -> String {
    let mut text = format!(
        "{} severity vulnerability {} (CVSS {:.1})",
        vulnerability.severity, vulnerability.cve, vulnerability.cvss_score
    );
    if vulnerability.exploitable {
        text.push_str(", known exploit available");
    }
    match vulnerability.fix_versions.iter().max() {
        Some(fix) => text.push_str(&format!(", fixed in {fix}")),
        None => text.push_str(", no fix available"),
    }
    text
}

fn finding_message(scan: &ScanResult, vulnerability: &Vulnerability, package: &Package) -> String {
    let mut text = format!(
        "{} ({}, CVSS {:.1}) found in {} package {}@{}",
        vulnerability.cve,
        vulnerability.severity,
        vulnerability.cvss_score,
        package.package_type,
        package.name,
        package.version
    );
    if let Some(layer) = package
        .layer_digest
        .as_deref()
        .and_then(|digest| scan.layer(digest))
    {
        match &layer.command {
            Some(command) => text.push_str(&format!(", introduced by layer '{command}'")),
            None => text.push_str(&format!(", introduced by layer {}", layer.digest)),
        }
    }
    match vulnerability.fix_versions.iter().max() {
        Some(fix) => text.push_str(&format!(". Fixed in {fix}")),
        None => text.push_str(". No fix available"),
    }
    text
}

fn package_location(package: &Package) -> Location {
    Location {
        physical_location: PhysicalLocation {
            artifact_location: ArtifactLocation {
                uri: package
                    .path
                    .clone()
                    .unwrap_or_else(|| package.identifier()),
            },
            region: Region { start_line: 1 },
        },
    }
}

/// Structured summary of a filtered scan, pure data for the presenter.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub target: String,
    pub scanner_version: String,
    pub evaluation: EvaluationResult,
    pub severity_breakdown: SeverityBreakdown,
    pub policies: Vec<PolicySummary>,
    pub packages: Vec<PackageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: Version,
    pub package_type: PackageType,
    pub highest_severity: Severity,
    pub suggested_fix: Option<Version>,
    pub vulnerabilities: Vec<VulnerabilityRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VulnerabilityRow {
    pub cve: String,
    pub severity: Severity,
    pub cvss_score: f64,
    pub exploitable: bool,
    pub fix_versions: Vec<Version>,
}

impl SummaryReport {
    /// Build the summary from a filtered, sorted package sequence.
    pub fn from_scan(scan: &ScanResult, packages: &[Package]) -> Self {
        let mut policies: Vec<PolicySummary> = scan
            .policies()
            .values()
            .map(|policy| PolicySummary {
                id: policy.id.clone(),
                name: policy.name.clone(),
                evaluation: policy.evaluation_result(),
            })
            .collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));

        let package_rows = packages
            .iter()
            .map(|package| {
                let vulns: Vec<Vulnerability> = package
                    .vulnerability_ids
                    .iter()
                    .filter_map(|id| scan.vulnerability(id.as_str()))
                    .cloned()
                    .collect();
                let vulns = sort_vulnerabilities(vulns);
                PackageSummary {
                    name: package.name.clone(),
                    version: package.version.clone(),
                    package_type: package.package_type,
                    highest_severity: package.highest_severity(scan.vulnerabilities()),
                    suggested_fix: package.suggested_fix_version(scan.vulnerabilities()),
                    vulnerabilities: vulns
                        .into_iter()
                        .map(|v| VulnerabilityRow {
                            cve: v.cve.to_string(),
                            severity: v.severity,
                            cvss_score: v.cvss_score,
                            exploitable: v.exploitable,
                            fix_versions: v.fix_versions,
                        })
                        .collect(),
                }
            })
            .collect();

        SummaryReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            target: scan.metadata.target.clone(),
            scanner_version: scan.metadata.scanner_version.clone(),
            evaluation: scan.evaluation_result(),
            severity_breakdown: scan.severity_breakdown(packages),
            policies,
            packages: package_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScanMetadata, VulnerabilityId};

    fn test_scan() -> ScanResult {
        ScanResult::new(ScanMetadata::new(
            "registry.example.com/app:1.0".to_string(),
            "2024-03-01T12:00:00Z".parse().unwrap(),
            "5.1.0".to_string(),
        ))
    }

    fn vuln(cve: &str, severity: Severity, cvss: f64) -> Vulnerability {
        Vulnerability::new(
            VulnerabilityId::new(cve.to_string()).unwrap(),
            severity,
            cvss,
        )
    }

    fn package(name: &str, cves: &[&str]) -> Package {
        let mut p = Package::new(
            name.to_string(),
            PackageType::Os,
            Version::parse("1.0.0").unwrap(),
        )
        .unwrap();
        p.vulnerability_ids = cves
            .iter()
            .map(|c| VulnerabilityId::new(c.to_string()).unwrap())
            .collect();
        p
    }

    #[test]
    fn test_severity_level_mapping() {
        assert_eq!(severity_to_level(Severity::Critical), "error");
        assert_eq!(severity_to_level(Severity::High), "error");
        assert_eq!(severity_to_level(Severity::Medium), "warning");
        assert_eq!(severity_to_level(Severity::Low), "note");
        assert_eq!(severity_to_level(Severity::Negligible), "note");
        assert_eq!(severity_to_level(Severity::Unknown), "note");
    }

    #[test]
    fn test_group_by_package_single_rule_max_cvss() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::Critical, 9.8));
        scan.add_vulnerability(vuln("CVE-2024-0002", Severity::High, 7.2));
        let packages = vec![package("openssl", &["CVE-2024-0001", "CVE-2024-0002"])];

        let report = FindingsReport::from_scan(&scan, &packages, GroupingMode::Package);
        let driver = &report.runs[0].tool.driver;
        assert_eq!(driver.rules.len(), 1);
        assert_eq!(driver.rules[0].id, "os:openssl@1.0.0");
        assert_eq!(driver.rules[0].properties.security_severity, "9.8");
        // Both vulnerabilities become sub-entries of the single rule
        assert_eq!(report.runs[0].results.len(), 2);
        assert!(report.runs[0]
            .results
            .iter()
            .all(|r| r.rule_id == "os:openssl@1.0.0"));
    }

    #[test]
    fn test_group_by_vulnerability_rule_per_cve() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::High, 8.1));
        let packages = vec![
            package("openssl", &["CVE-2024-0001"]),
            package("libssl", &["CVE-2024-0001"]),
        ];

        let report = FindingsReport::from_scan(&scan, &packages, GroupingMode::Vulnerability);
        let driver = &report.runs[0].tool.driver;
        // One rule for the shared CVE, one result per affected package
        assert_eq!(driver.rules.len(), 1);
        assert_eq!(driver.rules[0].id, "CVE-2024-0001");
        assert_eq!(report.runs[0].results.len(), 2);
        assert!(report.runs[0].results.iter().all(|r| r.level == "error"));
    }

    #[test]
    fn test_rules_sorted_most_severe_first() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0003", Severity::Low, 3.1));
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::Medium, 5.0));
        scan.add_vulnerability(vuln("CVE-2024-0002", Severity::Critical, 9.9));
        let packages = vec![package(
            "openssl",
            &["CVE-2024-0003", "CVE-2024-0001", "CVE-2024-0002"],
        )];

        let report = FindingsReport::from_scan(&scan, &packages, GroupingMode::Vulnerability);
        let ids: Vec<&str> = report.runs[0]
            .tool
            .driver
            .rules
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["CVE-2024-0002", "CVE-2024-0001", "CVE-2024-0003"]);
        let levels: Vec<&str> = report.runs[0]
            .results
            .iter()
            .map(|r| r.level.as_str())
            .collect();
        assert_eq!(levels, vec!["error", "warning", "note"]);
    }

    #[test]
    fn test_location_prefers_package_path() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::High, 8.0));
        let mut with_path = package("lodash", &["CVE-2024-0001"]);
        with_path.path = Some("/app/node_modules/lodash/package.json".to_string());
        let bare = package("openssl", &["CVE-2024-0001"]);

        let report =
            FindingsReport::from_scan(&scan, &[with_path, bare], GroupingMode::Vulnerability);
        let uris: Vec<&str> = report.runs[0]
            .results
            .iter()
            .map(|r| r.locations[0].physical_location.artifact_location.uri.as_str())
            .collect();
        assert!(uris.contains(&"/app/node_modules/lodash/package.json"));
        assert!(uris.contains(&"os:openssl@1.0.0"));
    }

    #[test]
    fn test_findings_deterministic_for_same_input() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::High, 8.1));
        scan.add_vulnerability(vuln("CVE-2024-0002", Severity::High, 6.0));
        let packages = vec![
            package("openssl", &["CVE-2024-0001", "CVE-2024-0002"]),
            package("zlib", &["CVE-2024-0002"]),
        ];

        let a = FindingsReport::from_scan(&scan, &packages, GroupingMode::Vulnerability);
        let b = FindingsReport::from_scan(&scan, &packages, GroupingMode::Vulnerability);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_summary_counts_and_policies() {
        let mut scan = test_scan();
        scan.add_vulnerability(vuln("CVE-2024-0001", Severity::Critical, 9.8));
        scan.add_vulnerability(vuln("CVE-2024-0002", Severity::Medium, 5.4));
        let packages = vec![package("openssl", &["CVE-2024-0001", "CVE-2024-0002"])];

        let summary = SummaryReport::from_scan(&scan, &packages);
        assert_eq!(summary.target, "registry.example.com/app:1.0");
        assert_eq!(summary.severity_breakdown.critical, 1);
        assert_eq!(summary.severity_breakdown.medium, 1);
        assert_eq!(summary.evaluation, EvaluationResult::Passed);
        assert_eq!(summary.packages.len(), 1);
        assert_eq!(summary.packages[0].highest_severity, Severity::Critical);
        assert!(summary.packages[0].suggested_fix.is_none());
        // Vulnerability rows come back most severe first
        assert_eq!(summary.packages[0].vulnerabilities[0].cve, "CVE-2024-0001");
        assert!(summary.policies.is_empty());
    }
}
