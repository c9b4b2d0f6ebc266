//! Scangate - scan report normalization and policy-gated findings
//!
//! This crate ingests raw vulnerability/IaC scan reports, hydrates them into
//! a deduplicated, fully-linked domain aggregate, evaluates the scanner's
//! policy verdicts, and synthesizes SARIF-style findings plus a structured
//! summary for downstream presenters.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
