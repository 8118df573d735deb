//! CLI command implementations

pub mod deploy;
pub mod validate;
pub mod verify;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use keel_deployment::OrchestratorConfig;
use keel_types::DeploymentPlan;
use tracing::debug;

use crate::error::CliResult;

/// Arguments shared by every command that reads a plan
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Deployment plan file (YAML)
    #[arg(short, long, env = "KEEL_PLAN", default_value = "keel.plan.yaml")]
    pub plan: PathBuf,
}

impl PlanArgs {
    pub fn load(&self) -> CliResult<DeploymentPlan> {
        let plan = DeploymentPlan::from_path(&self.plan)?;
        debug!(plan = %self.plan.display(), services = plan.len(), "Plan loaded");
        Ok(plan)
    }
}

/// Health verification overrides
#[derive(Debug, Args)]
pub struct TrackerArgs {
    /// Maximum number of services verified concurrently
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Deadline for the whole verification phase (e.g. "10m")
    #[arg(long, value_parser = parse_duration)]
    pub deadline: Option<Duration>,
}

impl TrackerArgs {
    pub fn apply(&self, config: &mut OrchestratorConfig) {
        if let Some(max) = self.max_concurrency {
            config.tracker.max_concurrency = max;
        }
        if let Some(deadline) = self.deadline {
            config.tracker.global_deadline = Some(deadline);
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
