//! Probe outcomes
//!
//! A [`ProbeOutcome`] is produced fresh for every attempt and never mutated.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which probe of a service produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeRole {
    Primary,
    Fallback,
}

impl fmt::Display for ProbeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeRole::Primary => write!(f, "primary"),
            ProbeRole::Fallback => write!(f, "fallback"),
        }
    }
}

/// Classified cause of a failed probe or verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Nothing listening on the target
    ConnRefused,
    /// Connect or request exceeded its bound
    Timeout,
    /// Host name could not be resolved
    DnsFail,
    /// Endpoint answered, but not with the expected content
    BadResponse,
    /// Any other transport fault (reset, TLS, malformed target)
    Transport,
    /// The verification phase as a whole ran out of time
    TimeoutGlobal,
}

impl ErrorKind {
    /// Whether the endpoint was reached at all.
    pub fn reached_endpoint(&self) -> bool {
        matches!(self, ErrorKind::BadResponse)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConnRefused => "CONN_REFUSED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DnsFail => "DNS_FAIL",
            ErrorKind::BadResponse => "BAD_RESPONSE",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::TimeoutGlobal => "TIMEOUT_GLOBAL",
        };
        f.write_str(s)
    }
}

/// Result of one probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Probe that was executed
    pub role: ProbeRole,

    /// Whether the endpoint answered as expected
    pub succeeded: bool,

    /// Time spent on the probe
    #[serde(with = "humantime_serde")]
    pub observed_latency: Duration,

    /// Classified failure cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,

    /// Human-readable failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn success(role: ProbeRole, observed_latency: Duration) -> Self {
        Self {
            role,
            succeeded: true,
            observed_latency,
            error: None,
            detail: None,
        }
    }

    pub fn failure(
        role: ProbeRole,
        error: ErrorKind,
        detail: impl Into<String>,
        observed_latency: Duration,
    ) -> Self {
        Self {
            role,
            succeeded: false,
            observed_latency,
            error: Some(error),
            detail: Some(detail.into()),
        }
    }
}
