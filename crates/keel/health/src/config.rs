//! Health verification configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, HealthResult};

/// Configuration for the service health tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Upper bound on concurrently verified services.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for the whole verification phase.
    #[serde(default, with = "humantime_serde")]
    pub global_deadline: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            global_deadline: None,
        }
    }
}

impl TrackerConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_global_deadline(mut self, deadline: Duration) -> Self {
        self.global_deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> HealthResult<()> {
        if self.max_concurrency == 0 {
            return Err(HealthError::ConfigurationError(
                "max_concurrency must be greater than zero".into(),
            ));
        }
        if self.global_deadline == Some(Duration::ZERO) {
            return Err(HealthError::ConfigurationError(
                "global_deadline must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Worker pool size for a plan of `services` services.
    pub fn pool_size(&self, services: usize) -> usize {
        services.min(self.max_concurrency).max(1)
    }
}

fn default_max_concurrency() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_is_capped() {
        let config = TrackerConfig::default().with_max_concurrency(4);
        assert_eq!(config.pool_size(3), 3);
        assert_eq!(config.pool_size(40), 4);
        assert_eq!(config.pool_size(0), 1);
    }

    #[test]
    fn test_validate() {
        assert!(TrackerConfig::default().validate().is_ok());
        assert!(TrackerConfig::default()
            .with_max_concurrency(0)
            .validate()
            .is_err());
        assert!(TrackerConfig::default()
            .with_global_deadline(Duration::ZERO)
            .validate()
            .is_err());
    }
}
