//! Plan configuration errors
//!
//! Every variant is fatal for a run and is raised before any side effect.

use thiserror::Error;

/// Malformed or missing deployment plan input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("deployment plan declares no services")]
    EmptyPlan,

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("service at position {0}: name must not be empty")]
    EmptyName(usize),

    #[error("service {service}: max_attempts must be greater than zero")]
    ZeroAttempts { service: String },

    #[error("service {service}: {role} probe has no target")]
    MissingTarget { service: String, role: String },

    #[error("service {service}: {role} probe target {target:?} is invalid: {reason}")]
    InvalidTarget {
        service: String,
        role: String,
        target: String,
        reason: String,
    },

    #[error("service {service}: {role} HTTP probe requires a success pattern")]
    MissingPattern { service: String, role: String },

    #[error("service {service}: {role} probe pattern is not a valid regex: {reason}")]
    InvalidPattern {
        service: String,
        role: String,
        reason: String,
    },

    #[error("startup order references unknown service: {0}")]
    UnknownStartupEntry(String),

    #[error("startup order lists service more than once: {0}")]
    DuplicateStartupEntry(String),

    #[error("service missing from startup order: {0}")]
    MissingStartupEntry(String),

    #[error("failed to read plan {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Result type for plan validation.
pub type ConfigResult<T> = Result<T, ConfigError>;
