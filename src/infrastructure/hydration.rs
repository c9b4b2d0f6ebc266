//! Report hydration adapter
//!
//! Builds a [`ScanResult`] aggregate from the loosely-typed JSON report the
//! scanning engine emits. Field presence and types are not statically
//! guaranteed: only the required top-level metadata can abort hydration,
//! every other anomaly resolves to a placeholder and a warning.
//!
//! The six phases run in a fixed order because later phases link against
//! entities created by earlier ones: metadata shell, layers, accepted risks,
//! vulnerabilities (risk links resolve here, so risks must already exist),
//! packages (layer/vulnerability/risk links), policies (failure references
//! cross-checked against the hydrated entities).

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::errors::HydrationError;
use crate::domain::{
    AcceptedRisk, EvaluationResult, Layer, Package, PackageType, Policy, PolicyBundle,
    PolicyBundleRule, PolicyRuleKind, RiskContext, RuleFailure, ScanMetadata, ScanResult,
    Severity, Version, Vulnerability, VulnerabilityId,
};

/// Adapter from a raw report document to the domain aggregate.
pub struct ReportHydrator;

impl Default for ReportHydrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportHydrator {
    pub fn new() -> Self {
        Self
    }

    /// Parse and hydrate a raw JSON report.
    pub fn hydrate_str(&self, content: &str) -> Result<ScanResult, HydrationError> {
        let document: Value = serde_json::from_str(content)?;
        self.hydrate(&document)
    }

    /// Hydrate an already-parsed report document.
    pub fn hydrate(&self, document: &Value) -> Result<ScanResult, HydrationError> {
        let mut scan = self.scan_shell(document)?;
        self.add_layers(&mut scan, document);
        self.add_accepted_risks(&mut scan, document);
        self.add_vulnerabilities(&mut scan, document);
        self.add_packages(&mut scan, document);
        self.add_policies(&mut scan, document);
        Ok(scan)
    }

    /// Phase 1: the aggregate shell from top-level metadata. The only phase
    /// allowed to fail.
    fn scan_shell(&self, document: &Value) -> Result<ScanResult, HydrationError> {
        let metadata =
            document
                .get("metadata")
                .ok_or_else(|| HydrationError::MissingMetadata {
                    field: "metadata".to_string(),
                })?;

        let target = required_str(metadata, "target")?;
        let scan_time_raw = required_str(metadata, "scanTime")?;
        let scanner_version = required_str(metadata, "scannerVersion")?;

        let scan_time = scan_time_raw.parse::<DateTime<Utc>>().map_err(|_| {
            HydrationError::InvalidTimestamp {
                value: scan_time_raw.to_string(),
            }
        })?;

        let mut meta = ScanMetadata::new(
            target.to_string(),
            scan_time,
            scanner_version.to_string(),
        );
        meta.image_id = str_field(metadata, "imageId");
        meta.digest = str_field(metadata, "digest");
        meta.os = str_field(metadata, "os");
        meta.size_bytes = metadata.get("size").and_then(Value::as_u64);
        meta.result_url = str_field(metadata, "resultUrl");

        debug!(target = %meta.target, "hydrated scan shell");
        Ok(ScanResult::new(meta))
    }

    /// Phase 2: layers.
    fn add_layers(&self, scan: &mut ScanResult, document: &Value) {
        for entry in array(document, "layers") {
            let Some(digest) = str_field(entry, "digest") else {
                warn!("skipping layer without digest");
                continue;
            };
            let mut layer = Layer::new(digest);
            layer.index = entry.get("index").and_then(Value::as_u64).map(|i| i as u32);
            layer.command = str_field(entry, "command");
            layer.size_bytes = entry.get("size").and_then(Value::as_u64);
            scan.add_layer(layer);
        }
        debug!(count = scan.layers().len(), "hydrated layers");
    }

    /// Phase 3: accepted risks. Links to vulnerabilities and packages are
    /// established by the later phases.
    fn add_accepted_risks(&self, scan: &mut ScanResult, document: &Value) {
        for entry in array(document, "acceptedRisks") {
            let Some(id) = str_field(entry, "id") else {
                warn!("skipping accepted risk without id");
                continue;
            };
            let reason = str_field(entry, "reason").unwrap_or_default();
            let mut risk = AcceptedRisk::new(id, reason);
            risk.description = str_field(entry, "description");
            risk.expires_at = str_field(entry, "expirationDate")
                .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
            risk.active = str_field(entry, "status")
                .map(|s| s.eq_ignore_ascii_case("active"))
                .unwrap_or(true);
            for context in array(entry, "context") {
                risk.contexts.push(RiskContext {
                    vulnerability_id: str_field(context, "vulnerabilityId"),
                    package_name: str_field(context, "packageName"),
                    package_version: str_field(context, "packageVersion"),
                });
            }
            scan.add_accepted_risk(risk);
        }
        debug!(count = scan.accepted_risks().len(), "hydrated accepted risks");
    }

    /// Phase 4: vulnerabilities, linked to the risks that target them.
    fn add_vulnerabilities(&self, scan: &mut ScanResult, document: &Value) {
        for entry in array(document, "vulnerabilities") {
            let Some(raw_cve) = str_field(entry, "cve") else {
                warn!("skipping vulnerability without cve");
                continue;
            };
            let cve = match VulnerabilityId::new(raw_cve.clone()) {
                Ok(cve) => cve,
                Err(_) => {
                    warn!(cve = %raw_cve, "skipping vulnerability with invalid id");
                    continue;
                }
            };

            let severity_label = str_field(entry, "severity").unwrap_or_default();
            let severity = Severity::from_label(&severity_label);
            if severity == Severity::Unknown && !severity_label.is_empty() {
                warn!(
                    cve = cve.as_str(),
                    label = %severity_label,
                    "unrecognized severity label, using Unknown"
                );
            }

            let mut vulnerability = Vulnerability::new(
                cve,
                severity,
                entry.get("cvssScore").and_then(Value::as_f64).unwrap_or(0.0),
            );
            vulnerability.disclosure_date = str_field(entry, "disclosureDate")
                .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
            vulnerability.exploitable = entry
                .get("exploitable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            for raw in array(entry, "fixVersions").filter_map(Value::as_str) {
                match Version::parse(raw) {
                    Ok(version) => {
                        if !vulnerability.fix_versions.contains(&version) {
                            vulnerability.fix_versions.push(version);
                        }
                    }
                    Err(_) => {
                        warn!(
                            cve = vulnerability.cve.as_str(),
                            version = raw,
                            "skipping unparsable fix version"
                        );
                    }
                }
            }

            let cve_key = vulnerability.cve.as_str().to_string();
            scan.add_vulnerability(vulnerability);

            // Risks hydrated in phase 3 that already target this CVE
            let covering: Vec<String> = scan
                .accepted_risks()
                .values()
                .filter(|risk| risk.targets_vulnerability(&cve_key))
                .map(|risk| risk.id.clone())
                .collect();
            for risk_id in covering {
                scan.link_vulnerability_to_risk(&cve_key, &risk_id);
            }
        }
        debug!(count = scan.vulnerabilities().len(), "hydrated vulnerabilities");
    }

    /// Phase 5: packages, with has-checked links to layers, vulnerabilities
    /// and accepted risks.
    fn add_packages(&self, scan: &mut ScanResult, document: &Value) {
        for entry in array(document, "packages") {
            let Some(name) = str_field(entry, "name") else {
                warn!("skipping package without name");
                continue;
            };

            let type_label = str_field(entry, "type").unwrap_or_default();
            let package_type = PackageType::from_label(&type_label);
            if package_type == PackageType::Unknown && !type_label.is_empty() {
                warn!(
                    package = %name,
                    label = %type_label,
                    "unrecognized package type, using unknown"
                );
            }

            let version = match str_field(entry, "version") {
                Some(raw) => Version::parse(&raw).unwrap_or_else(|_| {
                    warn!(package = %name, version = %raw, "unparsable package version");
                    Version::new(0, 0, 0)
                }),
                None => Version::new(0, 0, 0),
            };

            let Ok(mut package) = Package::new(name.clone(), package_type, version) else {
                warn!(package = %name, "skipping invalid package");
                continue;
            };
            package.path = str_field(entry, "path");
            package.layer_digest = str_field(entry, "layerDigest");
            if let Some(digest) = &package.layer_digest {
                if scan.layer(digest).is_none() {
                    warn!(package = %name, digest = %digest, "package references unknown layer");
                }
            }

            let identifier = package.identifier();
            scan.add_package(package);

            for cve in array(entry, "vulnerabilities").filter_map(Value::as_str) {
                scan.link_package_to_vulnerability(&identifier, cve);
            }
            for risk_id in array(entry, "acceptedRisks").filter_map(Value::as_str) {
                scan.link_package_to_risk(&identifier, risk_id);
            }
            // Risks whose contexts name this package directly
            let covering: Vec<String> = scan
                .accepted_risks()
                .values()
                .filter(|risk| risk.targets_package(&name))
                .map(|risk| risk.id.clone())
                .collect();
            for risk_id in covering {
                scan.link_package_to_risk(&identifier, &risk_id);
            }
        }
        debug!(count = scan.packages().len(), "hydrated packages");
    }

    /// Phase 6: policies, bundles and rules, with failure references
    /// validated against the hydrated aggregate.
    fn add_policies(&self, scan: &mut ScanResult, document: &Value) {
        let policies: Vec<Policy> = array(document, "policies")
            .filter_map(|entry| {
                let Some(id) = str_field(entry, "id") else {
                    warn!("skipping policy without id");
                    return None;
                };
                let name = str_field(entry, "name").unwrap_or_else(|| id.clone());
                let bundles = array(entry, "bundles")
                    .filter_map(|bundle| self.hydrate_bundle(scan, bundle))
                    .collect();
                Some(Policy { id, name, bundles })
            })
            .collect();
        for policy in policies {
            scan.add_policy(policy);
        }
        debug!(count = scan.policies().len(), "hydrated policies");
    }

    fn hydrate_bundle(&self, scan: &ScanResult, entry: &Value) -> Option<PolicyBundle> {
        let Some(id) = str_field(entry, "id") else {
            warn!("skipping policy bundle without id");
            return None;
        };
        let name = str_field(entry, "name").unwrap_or_else(|| id.clone());
        let rules = array(entry, "rules")
            .map(|rule| self.hydrate_rule(scan, rule))
            .collect();
        Some(PolicyBundle { id, name, rules })
    }

    fn hydrate_rule(&self, scan: &ScanResult, entry: &Value) -> PolicyBundleRule {
        let id = str_field(entry, "id").unwrap_or_default();
        let evaluation = EvaluationResult::from_label(
            &str_field(entry, "evaluationResult").unwrap_or_default(),
        );

        let kind = match str_field(entry, "failureType").as_deref() {
            Some("imageConfigFailure") => PolicyRuleKind::ImageConfiguration {
                check: str_field(entry, "check").unwrap_or_default(),
                remediation: str_field(entry, "remediation"),
            },
            _ => PolicyRuleKind::PackageVulnerability {
                severity_threshold: Severity::from_label(
                    &str_field(entry, "severityThreshold").unwrap_or_default(),
                ),
                cvss_threshold: entry.get("cvssThreshold").and_then(Value::as_f64),
                failures: array(entry, "failures")
                    .map(|failure| self.hydrate_rule_failure(scan, failure))
                    .collect(),
            },
        };

        PolicyBundleRule {
            id,
            kind,
            evaluation,
        }
    }

    fn hydrate_rule_failure(&self, scan: &ScanResult, entry: &Value) -> RuleFailure {
        let description = str_field(entry, "description").unwrap_or_default();
        let package_ref = str_field(entry, "packageRef").and_then(|id| {
            if scan.package(&id).is_some() {
                Some(id)
            } else {
                warn!(package = %id, "rule failure references unknown package");
                None
            }
        });
        let vulnerability_ref = str_field(entry, "vulnerabilityRef").and_then(|cve| {
            if scan.vulnerability(&cve).is_some() {
                Some(cve)
            } else {
                warn!(cve = %cve, "rule failure references unknown vulnerability");
                None
            }
        });
        RuleFailure {
            description,
            package_ref,
            vulnerability_ref,
        }
    }
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, HydrationError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HydrationError::MissingMetadata {
            field: field.to_string(),
        })
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn array<'a>(value: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|entries| entries.iter())
        .unwrap_or_default()
}
