//! Domain services for filtering and ordering scan results
//!
//! Every filter stage maps a package sequence to a new package sequence and
//! leaves the aggregate untouched; unset stages pass their input through.

use super::entities::{Package, ScanResult, Vulnerability};
use super::value_objects::{PackageType, Severity, VulnerabilityId};

/// Filter pipeline configuration. Unset options skip their stage.
#[derive(Debug, Clone, Default)]
pub struct PackageFilters {
    pub include_types: Option<Vec<PackageType>>,
    pub exclude_types: Option<Vec<PackageType>>,
    pub minimum_severity: Option<Severity>,
    pub exclude_accepted: bool,
}

/// Applies the filter stages in their fixed order: package-type include,
/// package-type exclude, minimum severity, accepted-risk exclusion.
pub struct PackageFilter {
    filters: PackageFilters,
}

impl PackageFilter {
    pub fn new(filters: PackageFilters) -> Self {
        Self { filters }
    }

    pub fn apply(&self, packages: Vec<Package>, scan: &ScanResult) -> Vec<Package> {
        let packages = self.retain_included_types(packages);
        let packages = self.discard_excluded_types(packages);
        let packages = self.retain_minimum_severity(packages, scan);
        if self.filters.exclude_accepted {
            self.exclude_accepted_risks(packages, scan)
        } else {
            packages
        }
    }

    fn retain_included_types(&self, packages: Vec<Package>) -> Vec<Package> {
        match &self.filters.include_types {
            Some(types) if !types.is_empty() => packages
                .into_iter()
                .filter(|p| types.contains(&p.package_type))
                .collect(),
            _ => packages,
        }
    }

    fn discard_excluded_types(&self, packages: Vec<Package>) -> Vec<Package> {
        match &self.filters.exclude_types {
            Some(types) if !types.is_empty() => packages
                .into_iter()
                .filter(|p| !types.contains(&p.package_type))
                .collect(),
            _ => packages,
        }
    }

    /// A package survives when any of its resolvable vulnerabilities is at
    /// least as severe as the threshold.
    fn retain_minimum_severity(&self, packages: Vec<Package>, scan: &ScanResult) -> Vec<Package> {
        let Some(minimum) = self.filters.minimum_severity else {
            return packages;
        };
        packages
            .into_iter()
            .filter(|package| {
                package
                    .vulnerability_ids
                    .iter()
                    .filter_map(|id| scan.vulnerability(id.as_str()))
                    .any(|v| v.severity.at_least(minimum))
            })
            .collect()
    }

    /// Strips vulnerabilities fully covered by an applicable accepted risk,
    /// then drops packages left with no unaccepted vulnerability. The
    /// severity floor is re-checked over what remains, so a package is never
    /// retained solely by a suppressed finding.
    fn exclude_accepted_risks(&self, packages: Vec<Package>, scan: &ScanResult) -> Vec<Package> {
        packages
            .into_iter()
            .filter_map(|mut package| {
                let remaining: Vec<VulnerabilityId> = package
                    .vulnerability_ids
                    .iter()
                    .filter(|cve| !scan.accepted_risk_covers(cve.as_str(), &package))
                    .cloned()
                    .collect();
                let meets_floor = match self.filters.minimum_severity {
                    Some(minimum) => remaining
                        .iter()
                        .filter_map(|id| scan.vulnerability(id.as_str()))
                        .any(|v| v.severity.at_least(minimum)),
                    None => true,
                };
                if remaining.is_empty() || !meets_floor {
                    None
                } else {
                    package.vulnerability_ids = remaining;
                    Some(package)
                }
            })
            .collect()
    }
}

/// Orders packages most severe first, identifier as the tie-break.
pub fn sort_packages(mut packages: Vec<Package>, scan: &ScanResult) -> Vec<Package> {
    packages.sort_by(|a, b| {
        a.highest_severity(scan.vulnerabilities())
            .cmp(&b.highest_severity(scan.vulnerabilities()))
            .then_with(|| a.identifier().cmp(&b.identifier()))
    });
    packages
}

/// Orders vulnerabilities most severe first, CVE id as the tie-break.
pub fn sort_vulnerabilities(mut vulnerabilities: Vec<Vulnerability>) -> Vec<Vulnerability> {
    vulnerabilities.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.cve.cmp(&b.cve))
    });
    vulnerabilities
}
