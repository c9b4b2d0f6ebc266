//! Configuration management

use serde::{Deserialize, Serialize};

use crate::application::reports::GroupingMode;
use crate::domain::{PackageFilters, PackageType, Severity};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub report: ReportConfig,
    pub filters: FilterConfig,
    pub logging: LoggingConfig,
}

/// Report synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// How findings are grouped into rules.
    pub grouping: GroupingMode,
}

/// Package filter configuration. Labels are parsed with the domain's total
/// parsers, so unrecognized values degrade instead of failing the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Package types to keep. Empty keeps every type.
    pub package_types: Vec<String>,
    /// Package types to drop after the include filter.
    pub exclude_package_types: Vec<String>,
    /// Drop packages whose vulnerabilities are all below this severity.
    pub minimum_severity: Option<String>,
    /// Drop vulnerabilities covered by an accepted risk.
    pub exclude_accepted: bool,
}

impl FilterConfig {
    /// Convert the raw string configuration into domain filter settings.
    pub fn to_filters(&self) -> PackageFilters {
        let parse_types = |labels: &[String]| -> Option<Vec<PackageType>> {
            if labels.is_empty() {
                None
            } else {
                Some(labels.iter().map(|l| PackageType::from_label(l)).collect())
            }
        };
        PackageFilters {
            include_types: parse_types(&self.package_types),
            exclude_types: parse_types(&self.exclude_package_types),
            minimum_severity: self
                .minimum_severity
                .as_deref()
                .map(Severity::from_label),
            exclude_accepted: self.exclude_accepted,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report: ReportConfig {
                grouping: GroupingMode::Vulnerability,
            },
            filters: FilterConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SCANGATE").separator("__"));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.report.grouping, GroupingMode::Vulnerability);
        assert!(config.filters.package_types.is_empty());
        assert!(!config.filters.exclude_accepted);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_filter_config_to_filters() {
        let filter_config = FilterConfig {
            package_types: vec!["os".to_string(), "python".to_string()],
            exclude_package_types: Vec::new(),
            minimum_severity: Some("high".to_string()),
            exclude_accepted: true,
        };
        let filters = filter_config.to_filters();
        assert_eq!(
            filters.include_types,
            Some(vec![PackageType::Os, PackageType::Python])
        );
        assert!(filters.exclude_types.is_none());
        assert_eq!(filters.minimum_severity, Some(Severity::High));
        assert!(filters.exclude_accepted);
    }

    #[test]
    fn test_unset_filters_skip_stages() {
        let filters = FilterConfig::default().to_filters();
        assert!(filters.include_types.is_none());
        assert!(filters.exclude_types.is_none());
        assert!(filters.minimum_severity.is_none());
        assert!(!filters.exclude_accepted);
    }
}
