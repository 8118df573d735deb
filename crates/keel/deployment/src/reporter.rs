//! Deployment reports

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use colored::Colorize;
use keel_types::{
    DeploymentPlan, DeploymentResult, HealthVerdict, OverallVerdict, ServiceHealthRecord,
};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::orchestrator::RunOutcome;

/// Table row for one verified service
#[derive(Debug, Tabled)]
struct ServiceRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "ATTEMPTS")]
    attempts: String,
    #[tabled(rename = "FALLBACK")]
    fallback: String,
    #[tabled(rename = "ERROR")]
    error: String,
    #[tabled(rename = "ENDPOINTS")]
    endpoints: String,
}

impl From<&ServiceHealthRecord> for ServiceRow {
    fn from(record: &ServiceHealthRecord) -> Self {
        Self {
            service: record.service.name.clone(),
            state: record.final_state.to_string(),
            attempts: format!("{}/{}", record.attempts_used, record.service.max_attempts),
            fallback: if record.used_fallback { "yes" } else { "no" }.to_string(),
            error: record
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string()),
            endpoints: record.service.access_endpoints().join(", "),
        }
    }
}

/// Aggregates verification records and renders them for operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    color: bool,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Build the immutable result for a verification phase.
    pub fn aggregate(
        records: BTreeMap<String, ServiceHealthRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> DeploymentResult {
        DeploymentResult::aggregate(records, started_at, finished_at)
    }

    /// Human-readable report, one row per verified service in startup order.
    pub fn render(&self, result: &DeploymentResult, plan: &DeploymentPlan) -> String {
        let rows: Vec<ServiceRow> = plan
            .startup_order()
            .iter()
            .filter_map(|name| result.record(name))
            .map(ServiceRow::from)
            .collect();

        let mut out = String::new();
        if rows.is_empty() {
            out.push_str("No services were verified\n");
        } else {
            let mut table = Table::new(rows);
            table.with(Style::sharp());
            out.push_str(&table.to_string());
            out.push('\n');
        }

        let seconds = result.duration().num_milliseconds() as f64 / 1000.0;
        out.push_str(&format!(
            "\nOverall: {} ({} healthy, {} degraded, {} failed) in {:.1}s\n",
            self.paint_overall(result.overall),
            result.count(HealthVerdict::Healthy),
            result.count(HealthVerdict::Degraded),
            result.count(HealthVerdict::Failed),
            seconds,
        ));
        out
    }

    /// Render a complete run, including aborted ones.
    pub fn render_outcome(&self, outcome: &RunOutcome, plan: &DeploymentPlan) -> String {
        match outcome {
            RunOutcome::Reported(result) => self.render(result, plan),
            RunOutcome::Aborted { phase, reason } => {
                let label = format!("ABORTED during {phase}");
                let label = if self.color {
                    label.red().bold().to_string()
                } else {
                    label
                };
                format!("Deployment {label}: {reason}\n")
            }
        }
    }

    fn paint_overall(&self, overall: OverallVerdict) -> String {
        let text = overall.to_string();
        if !self.color {
            return text;
        }
        match overall {
            OverallVerdict::Success => text.green().bold().to_string(),
            OverallVerdict::Partial => text.yellow().bold().to_string(),
            OverallVerdict::Failure => text.red().bold().to_string(),
        }
    }
}
