//! Per-service health records

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::{ErrorKind, ProbeOutcome, ProbeRole};
use crate::service::ServiceSpec;

/// Terminal classification of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthVerdict {
    /// Some attempt succeeded
    Healthy,
    /// No attempt succeeded, but the fallback endpoint answered with the wrong content
    Degraded,
    /// No attempt succeeded
    Failed,
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthVerdict::Healthy => write!(f, "HEALTHY"),
            HealthVerdict::Degraded => write!(f, "DEGRADED"),
            HealthVerdict::Failed => write!(f, "FAILED"),
        }
    }
}

/// Verification history and verdict for one service.
///
/// Owned by a single verification task until it is published; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    /// Spec that was verified
    pub service: ServiceSpec,

    /// Attempts consumed (never exceeds `service.max_attempts`)
    pub attempts_used: u32,

    /// Whether the fallback probe was executed
    pub used_fallback: bool,

    /// Terminal verdict
    pub final_state: HealthVerdict,

    /// Terminal error, if the service did not become healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,

    /// Every probe outcome, in execution order
    pub history: Vec<ProbeOutcome>,
}

impl ServiceHealthRecord {
    /// Build a terminal record from an attempt history.
    ///
    /// `Healthy` requires a successful outcome; otherwise a fallback answer with
    /// the wrong content yields `Degraded` and anything else `Failed`.
    pub fn conclude(service: ServiceSpec, attempts_used: u32, history: Vec<ProbeOutcome>) -> Self {
        let used_fallback = history.iter().any(|o| o.role == ProbeRole::Fallback);

        let (final_state, error) = if history.iter().any(|o| o.succeeded) {
            (HealthVerdict::Healthy, None)
        } else {
            let fallback_reached = history.iter().any(|o| {
                o.role == ProbeRole::Fallback && o.error.is_some_and(|e| e.reached_endpoint())
            });
            let last_error = history.iter().rev().find_map(|o| o.error);

            if fallback_reached {
                (HealthVerdict::Degraded, Some(ErrorKind::BadResponse))
            } else {
                (HealthVerdict::Failed, last_error)
            }
        };

        Self {
            attempts_used: attempts_used.min(service.max_attempts),
            service,
            used_fallback,
            final_state,
            error,
            history,
        }
    }

    /// Record for a service whose verification was cut short by the global deadline.
    pub fn timed_out(service: ServiceSpec, attempts_used: u32, history: Vec<ProbeOutcome>) -> Self {
        let used_fallback = history.iter().any(|o| o.role == ProbeRole::Fallback);
        Self {
            attempts_used: attempts_used.min(service.max_attempts),
            service,
            used_fallback,
            final_state: HealthVerdict::Failed,
            error: Some(ErrorKind::TimeoutGlobal),
            history,
        }
    }

    pub fn name(&self) -> &str {
        &self.service.name
    }

    pub fn is_healthy(&self) -> bool {
        self.final_state == HealthVerdict::Healthy
    }
}
