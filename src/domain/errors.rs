//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for scan result modeling
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid version format: {version}")]
    InvalidVersion { version: String },

    #[error("Invalid vulnerability ID: {id}")]
    InvalidVulnerabilityId { id: String },

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },
}
