//! Validate command: check a plan without side effects

use clap::Args;
use humantime_serde::re::humantime::format_duration;
use keel_deployment::OrchestratorConfig;
use keel_types::{ProbeSpec, ServiceSpec};
use serde::Serialize;
use tabled::Tabled;

use super::PlanArgs;
use crate::error::{CliError, CliResult};
use crate::output::{print_output, print_success, print_warning, OutputFormat};

/// Validate arguments
#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub plan: PlanArgs,
}

/// Table row for plan display
#[derive(Debug, Serialize, Tabled)]
struct ServiceRow {
    /// Service name
    name: String,
    /// Primary probe
    probe: String,
    /// Fallback probe
    fallback: String,
    /// Attempt budget
    attempts: u32,
    /// Pause between attempts
    interval: String,
    /// Longest possible verification time
    worst_case: String,
}

impl From<&ServiceSpec> for ServiceRow {
    fn from(spec: &ServiceSpec) -> Self {
        let describe = |probe: &ProbeSpec| format!("{} {}", probe.kind, probe.target);
        Self {
            name: spec.name.clone(),
            probe: describe(&spec.primary_probe),
            fallback: spec
                .fallback_probe
                .as_ref()
                .map(describe)
                .unwrap_or_else(|| "-".to_string()),
            attempts: spec.max_attempts,
            interval: format_duration(spec.retry_interval).to_string(),
            worst_case: format_duration(spec.worst_case_duration()).to_string(),
        }
    }
}

/// Validate the plan and the verification settings
pub fn execute(
    args: ValidateArgs,
    config: &OrchestratorConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let plan = args.plan.load()?;
    config
        .tracker
        .validate()
        .map_err(|e| CliError::InvalidInput(e.to_string()))?;

    let rows: Vec<ServiceRow> = plan.ordered_services().map(ServiceRow::from).collect();
    print_output(rows, format)?;

    if format == OutputFormat::Table {
        print_success(&format!(
            "Plan {} is valid: {} services, startup order {}",
            args.plan.plan.display(),
            plan.len(),
            plan.startup_order().join(" -> ")
        ));
    }

    if let Some(deadline) = config.tracker.global_deadline {
        for spec in plan.services() {
            if spec.worst_case_duration() > deadline {
                print_warning(&format!(
                    "service {} may need up to {} which exceeds the global deadline of {}",
                    spec.name,
                    format_duration(spec.worst_case_duration()),
                    format_duration(deadline)
                ));
            }
        }
    }

    Ok(0)
}
