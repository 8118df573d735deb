//! Error types for keel-health crate.
//!
//! Probe failures are not errors: they are classified into
//! [`keel_types::ErrorKind`] and absorbed by the retry scheduler. The variants
//! here cover setting up the verification machinery itself.

use thiserror::Error;

/// Errors that can occur while building health verification components.
#[derive(Debug, Error)]
pub enum HealthError {
    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;
