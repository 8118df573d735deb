//! Deployment plans
//!
//! A [`DeploymentPlan`] is the complete, validated description of which
//! services to bring up and how to verify them. Plans can only be built
//! through validation, so holding one guarantees:
//!
//! - at least one service, with unique, non-empty names
//! - every service has `max_attempts > 0` and well-formed probes
//! - `startup_order` lists every service exactly once

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::service::ServiceSpec;

/// Raw, unvalidated plan as written by an operator.
///
/// ```yaml
/// services:
///   - name: app
///     primary_probe:
///       kind: http_body_contains
///       target: http://localhost:8080/actuator/health
///       success_pattern: { substring: UP }
///     fallback_probe:
///       kind: http_body_contains
///       target: http://localhost:8080/
///       success_pattern: { regex: "(?s).+" }
///     max_attempts: 30
///     retry_interval: 10s
///   - name: db
///     primary_probe: { kind: tcp_connect, target: "localhost:3306" }
/// startup_order: [db, app]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    pub services: Vec<ServiceSpec>,

    /// Defaults to declaration order when omitted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub startup_order: Vec<String>,
}

/// Validated deployment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanFile")]
pub struct DeploymentPlan {
    services: Vec<ServiceSpec>,
    startup_order: Vec<String>,
}

impl DeploymentPlan {
    /// Validate services and startup order into a plan.
    ///
    /// An empty `startup_order` means declaration order.
    pub fn new(services: Vec<ServiceSpec>, startup_order: Vec<String>) -> ConfigResult<Self> {
        if services.is_empty() {
            return Err(ConfigError::EmptyPlan);
        }

        let mut names = HashSet::with_capacity(services.len());
        for (position, service) in services.iter().enumerate() {
            service.validate(position)?;
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
        }

        let startup_order = if startup_order.is_empty() {
            services.iter().map(|s| s.name.clone()).collect()
        } else {
            let mut seen = HashSet::with_capacity(startup_order.len());
            for entry in &startup_order {
                if !names.contains(entry.as_str()) {
                    return Err(ConfigError::UnknownStartupEntry(entry.clone()));
                }
                if !seen.insert(entry.as_str()) {
                    return Err(ConfigError::DuplicateStartupEntry(entry.clone()));
                }
            }
            if let Some(missing) = services.iter().find(|s| !seen.contains(s.name.as_str())) {
                return Err(ConfigError::MissingStartupEntry(missing.name.clone()));
            }
            startup_order
        };

        Ok(Self {
            services,
            startup_order,
        })
    }

    /// Parse and validate a YAML plan.
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let file: PlanFile = serde_yaml::from_str(yaml)?;
        Self::try_from(file)
    }

    /// Read, parse and validate a YAML plan file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Services in declaration order.
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn startup_order(&self) -> &[String] {
        &self.startup_order
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services in startup order.
    pub fn ordered_services(&self) -> impl Iterator<Item = &ServiceSpec> + '_ {
        self.startup_order
            .iter()
            .filter_map(move |name| self.service(name))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl TryFrom<PlanFile> for DeploymentPlan {
    type Error = ConfigError;

    fn try_from(file: PlanFile) -> ConfigResult<Self> {
        Self::new(file.services, file.startup_order)
    }
}
