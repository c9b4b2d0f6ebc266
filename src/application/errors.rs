//! Application layer error types

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Hydration error: {0}")]
    Hydration(#[from] HydrationError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while building the aggregate from a raw report document.
///
/// Only missing or unusable required metadata aborts hydration; every other
/// anomaly in the document is absorbed with a fallback value.
#[derive(Error, Debug)]
pub enum HydrationError {
    #[error("Invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required metadata field: {field}")]
    MissingMetadata { field: String },

    #[error("Invalid scan timestamp: {value}")]
    InvalidTimestamp { value: String },
}
