//! CLI error types

use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid deployment plan
    #[error("Invalid plan: {0}")]
    Plan(#[from] keel_types::ConfigError),

    /// Health verification could not be set up
    #[error("Health verification error: {0}")]
    Health(#[from] keel_health::HealthError),

    /// Orchestrator misuse
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] keel_deployment::OrchestratorError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Exit status for errors raised before a run starts.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Orchestrator(_) => 4,
            _ => 1,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
