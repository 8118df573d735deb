//! Service and probe specifications
//!
//! A [`ServiceSpec`] identifies one logical service in the stack (the
//! application, its datastore, a metrics collector) and describes how to
//! decide whether it is usable. Specs are immutable once a run starts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::outcome::ProbeRole;

/// One logical service of the stack and its verification budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service name (matches the container runtime's service name)
    pub name: String,

    /// Preferred health check
    pub primary_probe: ProbeSpec,

    /// Secondary check used when the primary one is not answering as expected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_probe: Option<ProbeSpec>,

    /// Maximum number of attempts (always > 0 in a validated plan)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sleep between attempts
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Bound on establishing a connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bound on a full request/response exchange
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Operator-facing access URLs shown in the report
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

impl ServiceSpec {
    /// Create a spec with default budget and no fallback.
    pub fn new(name: impl Into<String>, primary_probe: ProbeSpec) -> Self {
        Self {
            name: name.into(),
            primary_probe,
            fallback_probe: None,
            max_attempts: default_max_attempts(),
            retry_interval: default_retry_interval(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, probe: ProbeSpec) -> Self {
        self.fallback_probe = Some(probe);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    /// Endpoints to show an operator: the explicit list, or the probe targets.
    pub fn access_endpoints(&self) -> Vec<String> {
        if !self.endpoints.is_empty() {
            return self.endpoints.clone();
        }

        let mut targets = vec![self.primary_probe.target.clone()];
        if let Some(fallback) = &self.fallback_probe {
            if fallback.target != self.primary_probe.target {
                targets.push(fallback.target.clone());
            }
        }
        targets
    }

    /// Worst-case verification time for this service, saturating at
    /// [`Duration::MAX`].
    pub fn worst_case_duration(&self) -> Duration {
        let per_probe = |probe: &ProbeSpec| match probe.kind {
            ProbeKind::HttpBodyContains => self.request_timeout,
            ProbeKind::TcpConnect => self.connect_timeout,
        };

        let attempts = self.max_attempts;
        let per_attempt = match &self.fallback_probe {
            Some(fallback) => {
                per_probe(&self.primary_probe).checked_add(per_probe(fallback))
            }
            None => Some(per_probe(&self.primary_probe)),
        };

        per_attempt
            .and_then(|d| d.checked_mul(attempts))
            .and_then(|probing| {
                self.retry_interval
                    .checked_mul(attempts.saturating_sub(1))
                    .and_then(|sleeping| probing.checked_add(sleeping))
            })
            .unwrap_or(Duration::MAX)
    }

    /// Validate this spec in isolation.
    pub fn validate(&self, position: usize) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName(position));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts {
                service: self.name.clone(),
            });
        }

        self.primary_probe.validate(&self.name, ProbeRole::Primary)?;
        if let Some(fallback) = &self.fallback_probe {
            fallback.validate(&self.name, ProbeRole::Fallback)?;
        }

        Ok(())
    }
}

/// How to ask an endpoint whether it is healthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Kind of check
    pub kind: ProbeKind,

    /// URL for HTTP probes, `host:port` (optionally `tcp://host:port`) for TCP probes
    #[serde(default)]
    pub target: String,

    /// What a healthy response body must contain (HTTP only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_pattern: Option<SuccessPattern>,
}

impl ProbeSpec {
    /// HTTP probe succeeding when the body contains `needle`.
    pub fn http(target: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            kind: ProbeKind::HttpBodyContains,
            target: target.into(),
            success_pattern: Some(SuccessPattern::Substring(needle.into())),
        }
    }

    /// HTTP probe succeeding when the body matches `pattern`.
    pub fn http_regex(target: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            kind: ProbeKind::HttpBodyContains,
            target: target.into(),
            success_pattern: Some(SuccessPattern::Regex(pattern.into())),
        }
    }

    /// TCP connect probe.
    pub fn tcp(target: impl Into<String>) -> Self {
        Self {
            kind: ProbeKind::TcpConnect,
            target: target.into(),
            success_pattern: None,
        }
    }

    /// Normalized `host:port` for TCP probes.
    pub fn tcp_address(&self) -> Result<String, String> {
        let raw = self.target.trim();
        let address = raw.strip_prefix("tcp://").unwrap_or(raw);

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| "expected host:port".to_string())?;

        if host.is_empty() {
            return Err("host is empty".into());
        }

        port.parse::<u16>()
            .map_err(|e| format!("invalid port {port:?}: {e}"))?;

        Ok(address.to_string())
    }

    /// Compile the success pattern.
    ///
    /// Probes without a pattern match any body.
    pub fn matcher(&self) -> Result<PatternMatcher, regex::Error> {
        match &self.success_pattern {
            None => Ok(PatternMatcher::Any),
            Some(SuccessPattern::Substring(needle)) => Ok(PatternMatcher::Substring(needle.clone())),
            Some(SuccessPattern::Regex(pattern)) => {
                Ok(PatternMatcher::Regex(regex::Regex::new(pattern)?))
            }
        }
    }

    fn validate(&self, service: &str, role: ProbeRole) -> ConfigResult<()> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::MissingTarget {
                service: service.to_string(),
                role: role.to_string(),
            });
        }

        let invalid = |reason: String| ConfigError::InvalidTarget {
            service: service.to_string(),
            role: role.to_string(),
            target: self.target.clone(),
            reason,
        };

        match self.kind {
            ProbeKind::HttpBodyContains => {
                let url = url::Url::parse(&self.target).map_err(|e| invalid(e.to_string()))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(invalid(format!("unsupported scheme {}", url.scheme())));
                }

                if self.success_pattern.is_none() {
                    return Err(ConfigError::MissingPattern {
                        service: service.to_string(),
                        role: role.to_string(),
                    });
                }

                self.matcher().map_err(|e| ConfigError::InvalidPattern {
                    service: service.to_string(),
                    role: role.to_string(),
                    reason: e.to_string(),
                })?;
            }
            ProbeKind::TcpConnect => {
                self.tcp_address().map_err(invalid)?;
            }
        }

        Ok(())
    }
}

/// Kind of health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// GET the target and match the response body
    HttpBodyContains,
    /// Open a TCP connection to the target
    TcpConnect,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::HttpBodyContains => write!(f, "http"),
            ProbeKind::TcpConnect => write!(f, "tcp"),
        }
    }
}

/// Case-sensitive matcher a healthy body must satisfy.
///
/// Written as a single-key map, `{ substring: UP }` or `{ regex: "(?i)<html" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PatternFields", into = "PatternFields")]
pub enum SuccessPattern {
    Substring(String),
    Regex(String),
}

/// Serialized form of a [`SuccessPattern`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    substring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
}

impl TryFrom<PatternFields> for SuccessPattern {
    type Error = String;

    fn try_from(fields: PatternFields) -> Result<Self, Self::Error> {
        match (fields.substring, fields.regex) {
            (Some(needle), None) => Ok(SuccessPattern::Substring(needle)),
            (None, Some(pattern)) => Ok(SuccessPattern::Regex(pattern)),
            _ => Err("success_pattern needs exactly one of `substring` or `regex`".to_string()),
        }
    }
}

impl From<SuccessPattern> for PatternFields {
    fn from(pattern: SuccessPattern) -> Self {
        match pattern {
            SuccessPattern::Substring(needle) => PatternFields {
                substring: Some(needle),
                regex: None,
            },
            SuccessPattern::Regex(pattern) => PatternFields {
                substring: None,
                regex: Some(pattern),
            },
        }
    }
}

/// Compiled form of a [`SuccessPattern`].
#[derive(Debug, Clone)]
pub enum PatternMatcher {
    Any,
    Substring(String),
    Regex(regex::Regex),
}

impl PatternMatcher {
    pub fn is_match(&self, body: &str) -> bool {
        match self {
            PatternMatcher::Any => true,
            PatternMatcher::Substring(needle) => body.contains(needle.as_str()),
            PatternMatcher::Regex(re) => re.is_match(body),
        }
    }
}
