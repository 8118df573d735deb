//! Lifecycle controller: prepare and start a stack.
//!
//! Every runtime call is awaited before the next one is issued, and nothing
//! here is retried. Preparation reports explicit capabilities in [`Ready`]
//! which the start phase reads instead of global flags.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use keel_types::DeploymentPlan;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::build::BuildTool;
use crate::config::{DirectoryConfig, OrchestratorConfig};
use crate::error::{PrepError, StartError};
use crate::runtime::{ContainerRuntime, ServiceStatus};

/// Capabilities established by a successful `prepare`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ready {
    /// Service names declared by the compose file
    pub declared_services: Vec<String>,

    /// Runtime directories that exist with their configured modes
    pub provisioned_dirs: Vec<PathBuf>,

    /// Whether a build tool is configured for the start phase
    pub build_available: bool,
}

/// Services are running; they are not yet known to be healthy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Started {
    /// Runtime status of every service
    pub services: Vec<ServiceStatus>,

    /// Artifact produced by the build step, if one ran
    pub artifact: Option<PathBuf>,
}

struct BuildStep {
    tool: Arc<dyn BuildTool>,
    source_dir: PathBuf,
    skip_tests: bool,
}

/// Drives the container runtime and build tool through preparation and startup.
pub struct LifecycleController {
    runtime: Arc<dyn ContainerRuntime>,
    build: Option<BuildStep>,
    compose_file: PathBuf,
    artifacts: Vec<PathBuf>,
    directories: Vec<DirectoryConfig>,
    no_cache: bool,
}

impl LifecycleController {
    /// Create a controller for `config`, with all paths resolved against the
    /// project directory.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &OrchestratorConfig) -> Self {
        Self {
            runtime,
            build: None,
            compose_file: config.compose_file(),
            artifacts: config
                .lifecycle
                .artifacts
                .iter()
                .map(|p| config.resolve(p))
                .collect(),
            directories: config
                .lifecycle
                .directories
                .iter()
                .map(|d| DirectoryConfig {
                    path: config.resolve(&d.path),
                    mode: d.mode,
                })
                .collect(),
            no_cache: config.lifecycle.no_cache,
        }
    }

    /// Run `tool` before building images.
    pub fn with_build_tool(
        mut self,
        tool: Arc<dyn BuildTool>,
        source_dir: PathBuf,
        skip_tests: bool,
    ) -> Self {
        self.build = Some(BuildStep {
            tool,
            source_dir,
            skip_tests,
        });
        self
    }

    /// Check artifacts, validate the compose file, tear down previous
    /// instances and provision runtime directories.
    ///
    /// Safe to run repeatedly: teardown is best effort and directory
    /// creation tolerates existing directories.
    #[instrument(skip_all, fields(runtime = self.runtime.name(), services = plan.len()))]
    pub async fn prepare(&self, plan: &DeploymentPlan) -> Result<Ready, PrepError> {
        for path in std::iter::once(&self.compose_file).chain(&self.artifacts) {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(PrepError::MissingArtifact { path: path.clone() });
            }
            debug!(path = %path.display(), "Artifact present");
        }

        let declared_services = self
            .runtime
            .validate_config(&self.compose_file)
            .await
            .map_err(|source| PrepError::RuntimeConfig {
                path: self.compose_file.clone(),
                source,
            })?;

        let declared: HashSet<&str> = declared_services.iter().map(String::as_str).collect();
        if let Some(missing) = plan
            .startup_order()
            .iter()
            .find(|name| !declared.contains(name.as_str()))
        {
            return Err(PrepError::UndeclaredService {
                service: missing.clone(),
                path: self.compose_file.clone(),
            });
        }

        for service in plan.startup_order().iter().rev() {
            match self.runtime.teardown(std::slice::from_ref(service)).await {
                Ok(()) => debug!(service = %service, "Previous instance removed"),
                Err(e) => warn!(service = %service, error = %e, "Teardown failed, continuing"),
            }
        }

        let mut provisioned_dirs = Vec::with_capacity(self.directories.len());
        for dir in &self.directories {
            provision(dir).await?;
            provisioned_dirs.push(dir.path.clone());
        }

        let ready = Ready {
            declared_services,
            provisioned_dirs,
            build_available: self.build.is_some(),
        };
        info!(
            declared = ready.declared_services.len(),
            dirs = ready.provisioned_dirs.len(),
            build = ready.build_available,
            "Stack prepared"
        );
        Ok(ready)
    }

    /// Build, start and confirm every service in the plan is running.
    #[instrument(skip_all, fields(runtime = self.runtime.name()))]
    pub async fn start(&self, plan: &DeploymentPlan, ready: &Ready) -> Result<Started, StartError> {
        let artifact = match (&self.build, ready.build_available) {
            (Some(step), true) => {
                info!(source_dir = %step.source_dir.display(), skip_tests = step.skip_tests, "Building application");
                Some(step.tool.build(&step.source_dir, step.skip_tests).await?)
            }
            _ => None,
        };

        info!(no_cache = self.no_cache, "Building images");
        self.runtime.build_images(self.no_cache).await?;

        info!("Starting services");
        self.runtime.up(true).await.map_err(StartError::Up)?;

        let services = self.runtime.ps().await.map_err(StartError::Status)?;
        for name in plan.startup_order() {
            match services.iter().find(|s| &s.name == name) {
                Some(status) if status.is_running() => {
                    debug!(service = %name, "Service running");
                }
                Some(status) => {
                    return Err(StartError::NotStarted {
                        service: name.clone(),
                        status: status.status.clone(),
                    })
                }
                None => {
                    return Err(StartError::NotStarted {
                        service: name.clone(),
                        status: "missing".to_string(),
                    })
                }
            }
        }

        info!(services = services.len(), "Stack started");
        Ok(Started { services, artifact })
    }
}

async fn provision(dir: &DirectoryConfig) -> Result<(), PrepError> {
    let to_err = |source| PrepError::Provision {
        path: dir.path.clone(),
        source,
    };

    tokio::fs::create_dir_all(&dir.path).await.map_err(to_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = dir.mode {
            tokio::fs::set_permissions(&dir.path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(to_err)?;
        }
    }

    debug!(path = %dir.path.display(), mode = ?dir.mode, "Directory provisioned");
    Ok(())
}
