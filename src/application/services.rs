//! Application services orchestrating the scan pipeline

use tracing::{debug, info};

use super::errors::ApplicationError;
use super::reports::{FindingsReport, GroupingMode, SummaryReport};
use crate::config::Config;
use crate::domain::{
    sort_packages, EvaluationResult, Package, PackageFilter, ScanResult,
};
use crate::infrastructure::hydration::ReportHydrator;

/// Everything one scan invocation produces for downstream consumers.
#[derive(Debug)]
pub struct ScanOutcome {
    pub scan: ScanResult,
    pub evaluation: EvaluationResult,
    pub findings: FindingsReport,
    pub summary: SummaryReport,
}

/// Runs the full pipeline over one raw report document:
/// hydrate, filter, sort, synthesize.
pub struct ScanReportService {
    config: Config,
    hydrator: ReportHydrator,
}

impl ScanReportService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            hydrator: ReportHydrator::new(),
        }
    }

    /// Execute the pipeline against a raw JSON report.
    pub fn execute(&self, raw_report: &str) -> Result<ScanOutcome, ApplicationError> {
        let scan = self.hydrator.hydrate_str(raw_report)?;
        info!(
            target = %scan.metadata.target,
            packages = scan.packages().len(),
            vulnerabilities = scan.vulnerabilities().len(),
            policies = scan.policies().len(),
            "hydrated scan result"
        );

        let filter = PackageFilter::new(self.config.filters.to_filters());
        let packages: Vec<Package> = scan.packages().values().cloned().collect();
        let filtered = filter.apply(packages, &scan);
        let filtered = sort_packages(filtered, &scan);
        debug!(retained = filtered.len(), "filtered packages");

        let grouping = self.grouping_mode();
        let findings = FindingsReport::from_scan(&scan, &filtered, grouping);
        let summary = SummaryReport::from_scan(&scan, &filtered);
        let evaluation = scan.evaluation_result();
        info!(%evaluation, "scan evaluated");

        Ok(ScanOutcome {
            scan,
            evaluation,
            findings,
            summary,
        })
    }

    fn grouping_mode(&self) -> GroupingMode {
        self.config.report.grouping
    }
}
