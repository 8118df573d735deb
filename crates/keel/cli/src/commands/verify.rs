//! Verify command: probe an already running stack

use std::sync::Arc;

use clap::Args;
use keel_deployment::{OrchestratorConfig, RunOutcome};
use keel_health::{HealthTracker, NetworkProbeEngine};

use super::{PlanArgs, TrackerArgs};
use crate::error::CliResult;
use crate::output::{self, OutputFormat};

/// Verify arguments
#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    #[command(flatten)]
    pub tracker: TrackerArgs,
}

/// Verify every service in the plan without touching the runtime
pub async fn execute(
    args: VerifyArgs,
    mut config: OrchestratorConfig,
    format: OutputFormat,
    color: bool,
) -> CliResult<i32> {
    let plan = args.plan.load()?;
    args.tracker.apply(&mut config);

    let engine = Arc::new(NetworkProbeEngine::new()?);
    let tracker = HealthTracker::new(engine, config.tracker)?;

    let outcome = RunOutcome::Reported(tracker.run(&plan).await);
    output::print_outcome(&outcome, &plan, format, color)?;
    Ok(outcome.exit_code())
}
