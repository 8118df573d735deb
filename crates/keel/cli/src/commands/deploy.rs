//! Deploy command: prepare, start and verify a stack

use std::sync::Arc;

use clap::Args;
use keel_deployment::{
    CommandBuildTool, ComposeRuntime, DeploymentOrchestrator, LifecycleController,
    OrchestratorConfig,
};
use keel_health::{HealthTracker, NetworkProbeEngine};
use tracing::info;

use super::{PlanArgs, TrackerArgs};
use crate::error::CliResult;
use crate::output::{self, OutputFormat};

/// Deploy arguments
#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    #[command(flatten)]
    pub tracker: TrackerArgs,

    /// Build images without the layer cache
    #[arg(long)]
    pub no_cache: bool,

    /// Skip the test phase of the application build
    #[arg(long)]
    pub skip_tests: bool,

    /// Do not run the application build even if one is configured
    #[arg(long)]
    pub skip_build: bool,
}

/// Execute a deployment and return the process exit status
pub async fn execute(
    args: DeployArgs,
    mut config: OrchestratorConfig,
    format: OutputFormat,
    color: bool,
) -> CliResult<i32> {
    let plan = args.plan.load()?;

    args.tracker.apply(&mut config);
    config.lifecycle.no_cache |= args.no_cache;
    if args.skip_build {
        config.build = None;
    }
    if let Some(build) = config.build.as_mut() {
        build.skip_tests |= args.skip_tests;
    }

    let runtime = Arc::new(ComposeRuntime::new(&config.compose));
    let mut lifecycle = LifecycleController::new(runtime, &config);
    if let Some(build) = &config.build {
        lifecycle = lifecycle.with_build_tool(
            Arc::new(CommandBuildTool::new(build)),
            config.resolve(&build.source_dir),
            build.skip_tests,
        );
    }

    let engine = Arc::new(NetworkProbeEngine::new()?);
    let tracker = HealthTracker::new(engine, config.tracker.clone())?;
    let orchestrator = DeploymentOrchestrator::new(lifecycle, tracker);

    info!(
        services = plan.len(),
        compose_file = %config.compose_file().display(),
        "Deploying stack"
    );
    let outcome = orchestrator.run(&plan).await?;

    output::print_outcome(&outcome, &plan, format, color)?;
    Ok(outcome.exit_code())
}
