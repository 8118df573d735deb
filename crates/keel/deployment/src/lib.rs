//! Keel Deployment Engine
//!
//! Brings a stack to a running state through a container runtime, then
//! hands it to [`keel_health`] for verification and reports the result.
//!
//! ## Architectural Boundaries
//!
//! - `keel-types` owns: plans, probe outcomes, records and verdicts
//! - `keel-health` owns: probing, retries and concurrent verification
//! - `keel-deployment` owns: preparation, startup, the run state machine and reports
//!
//! The container runtime and build tool are reached only through the
//! [`ContainerRuntime`] and [`BuildTool`] traits.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use keel_deployment::{
//!     ComposeRuntime, DeploymentOrchestrator, LifecycleController, OrchestratorConfig, Reporter,
//! };
//! use keel_health::{HealthTracker, NetworkProbeEngine};
//! use keel_types::DeploymentPlan;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::load(Some("keel.toml"))?;
//! let plan = DeploymentPlan::from_path("keel.plan.yaml")?;
//!
//! let runtime = Arc::new(ComposeRuntime::new(&config.compose));
//! let lifecycle = LifecycleController::new(runtime, &config);
//! let tracker = HealthTracker::new(Arc::new(NetworkProbeEngine::new()?), config.tracker.clone())?;
//!
//! let orchestrator = DeploymentOrchestrator::new(lifecycle, tracker);
//! let outcome = orchestrator.run(&plan).await?;
//! print!("{}", Reporter::new(true).render_outcome(&outcome, &plan));
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod build;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod reporter;
pub mod runtime;

#[cfg(test)]
mod testing;

// Re-exports
pub use build::{BuildTool, CommandBuildTool};
pub use config::{
    BuildConfig, ComposeConfig, DirectoryConfig, LifecycleConfig, LoggingConfig,
    OrchestratorConfig,
};
pub use error::{
    BuildError, ImageBuildError, OrchestratorError, PrepError, Result, RuntimeError, StartError,
};
pub use lifecycle::{LifecycleController, Ready, Started};
pub use orchestrator::{DeploymentOrchestrator, OrchestratorEvent, RunOutcome, RunPhase};
pub use reporter::Reporter;
pub use runtime::{ComposeRuntime, ContainerRuntime, ServiceStatus};
