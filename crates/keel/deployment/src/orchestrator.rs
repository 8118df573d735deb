//! Deployment orchestrator
//!
//! One orchestrator drives exactly one run through
//! `Init -> Preparing -> Starting -> Verifying -> Reported`. Preparation and
//! startup failures abort the run; verification never does, since partial
//! and failed verdicts are ordinary results.

use std::fmt;
use std::sync::Mutex;

use keel_health::HealthTracker;
use keel_types::{DeploymentPlan, DeploymentResult, OverallVerdict};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::error::{OrchestratorError, Result};
use crate::lifecycle::LifecycleController;

/// Phase of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Init,
    Preparing,
    Starting,
    Verifying,
    Reported,
    Aborted,
}

impl RunPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Init, Preparing)
                | (Preparing, Starting)
                | (Preparing, Aborted)
                | (Starting, Verifying)
                | (Starting, Aborted)
                | (Verifying, Reported)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Reported | RunPhase::Aborted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "INIT",
            RunPhase::Preparing => "PREPARING",
            RunPhase::Starting => "STARTING",
            RunPhase::Verifying => "VERIFYING",
            RunPhase::Reported => "REPORTED",
            RunPhase::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Verification ran; the result may still be partial or failed
    Reported(DeploymentResult),

    /// The run stopped before verification
    Aborted { phase: RunPhase, reason: String },
}

impl RunOutcome {
    /// Process exit status: 0 success, 2 partial, 3 failure, 4 aborted.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Reported(result) => match result.overall {
                OverallVerdict::Success => 0,
                OverallVerdict::Partial => 2,
                OverallVerdict::Failure => 3,
            },
            RunOutcome::Aborted { .. } => 4,
        }
    }

    pub fn result(&self) -> Option<&DeploymentResult> {
        match self {
            RunOutcome::Reported(result) => Some(result),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    PhaseChanged { from: RunPhase, to: RunPhase },
}

/// Runs prepare, start and verification for one plan.
pub struct DeploymentOrchestrator {
    lifecycle: LifecycleController,
    tracker: HealthTracker,
    phase: Mutex<RunPhase>,
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DeploymentOrchestrator {
    pub fn new(lifecycle: LifecycleController, tracker: HealthTracker) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            lifecycle,
            tracker,
            phase: Mutex::new(RunPhase::Init),
            event_tx,
        }
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// The health tracker used for verification
    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Execute the run. A second call on the same instance is rejected.
    #[instrument(skip_all, fields(services = plan.len()))]
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<RunOutcome> {
        self.transition(RunPhase::Preparing).map_err(|e| match e {
            OrchestratorError::IllegalTransition { .. } => OrchestratorError::AlreadyRun,
            other => other,
        })?;

        let ready = match self.lifecycle.prepare(plan).await {
            Ok(ready) => ready,
            Err(e) => return self.abort(RunPhase::Preparing, e.to_string()),
        };

        self.transition(RunPhase::Starting)?;
        let started = match self.lifecycle.start(plan, &ready).await {
            Ok(started) => started,
            Err(e) => return self.abort(RunPhase::Starting, e.to_string()),
        };
        info!(services = started.services.len(), "Services started, verifying health");

        self.transition(RunPhase::Verifying)?;
        let result = self.tracker.run(plan).await;

        self.transition(RunPhase::Reported)?;
        info!(overall = %result.overall, "Deployment reported");
        Ok(RunOutcome::Reported(result))
    }

    fn abort(&self, phase: RunPhase, reason: String) -> Result<RunOutcome> {
        error!(phase = %phase, reason = %reason, "Deployment aborted");
        self.transition(RunPhase::Aborted)?;
        Ok(RunOutcome::Aborted { phase, reason })
    }

    fn transition(&self, to: RunPhase) -> Result<()> {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        let from = *phase;
        if !from.can_transition_to(to) {
            return Err(OrchestratorError::IllegalTransition { from, to });
        }
        *phase = to;
        drop(phase);

        info!(from = %from, to = %to, "Phase changed");
        let _ = self.event_tx.send(OrchestratorEvent::PhaseChanged { from, to });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use keel_health::probes::{ScriptStep, ScriptedProbeEngine};
    use keel_health::TrackerConfig;
    use keel_types::{ErrorKind, HealthVerdict, ProbeSpec, ServiceSpec};

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::testing::FakeRuntime;

    const APP: &str = "http://localhost:8080/actuator/health";
    const DB: &str = "localhost:3306";

    fn plan() -> DeploymentPlan {
        DeploymentPlan::new(
            vec![
                ServiceSpec::new("app", ProbeSpec::http(APP, "UP"))
                    .with_max_attempts(2)
                    .with_retry_interval(Duration::ZERO),
                ServiceSpec::new("db", ProbeSpec::tcp(DB)).with_max_attempts(1),
            ],
            vec!["db".into(), "app".into()],
        )
        .unwrap()
    }

    fn build(
        runtime: FakeRuntime,
        engine: ScriptedProbeEngine,
    ) -> (tempfile::TempDir, DeploymentOrchestrator) {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let mut config = OrchestratorConfig::default();
        config.compose.project_dir = root.path().to_path_buf();

        let lifecycle = LifecycleController::new(Arc::new(runtime), &config);
        let tracker = HealthTracker::new(Arc::new(engine), TrackerConfig::default()).unwrap();
        (root, DeploymentOrchestrator::new(lifecycle, tracker))
    }

    #[test]
    fn test_phase_transitions() {
        use RunPhase::*;
        assert!(Init.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Aborted));
        assert!(Starting.can_transition_to(Aborted));
        assert!(Verifying.can_transition_to(Reported));

        assert!(!Init.can_transition_to(Verifying));
        assert!(!Verifying.can_transition_to(Aborted));
        assert!(!Reported.can_transition_to(Preparing));
        assert!(!Aborted.can_transition_to(Preparing));
        assert!(!Preparing.can_transition_to(Preparing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_and_db_scenario_succeeds() {
        let engine = ScriptedProbeEngine::new()
            .script(APP, [ScriptStep::Fail(ErrorKind::ConnRefused)], ScriptStep::Succeed)
            .always(DB, ScriptStep::Succeed);
        let (_root, orchestrator) = build(FakeRuntime::new(["db", "app"]), engine);
        let mut events = orchestrator.subscribe();

        let outcome = orchestrator.run(&plan()).await.unwrap();

        assert_eq!(outcome.exit_code(), 0);
        let result = outcome.result().unwrap();
        assert_eq!(result.overall, OverallVerdict::Success);
        assert_eq!(result.record("app").unwrap().attempts_used, 2);
        assert_eq!(result.record("db").unwrap().attempts_used, 1);
        assert_eq!(orchestrator.phase(), RunPhase::Reported);

        let mut phases = Vec::new();
        while let Ok(OrchestratorEvent::PhaseChanged { to, .. }) = events.try_recv() {
            phases.push(to);
        }
        assert_eq!(
            phases,
            [
                RunPhase::Preparing,
                RunPhase::Starting,
                RunPhase::Verifying,
                RunPhase::Reported
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_and_failed_runs_are_reported() {
        let engine = ScriptedProbeEngine::new().always(DB, ScriptStep::Succeed);
        let (_root, orchestrator) = build(FakeRuntime::new(["db", "app"]), engine);

        let outcome = orchestrator.run(&plan()).await.unwrap();
        assert_eq!(outcome.exit_code(), 2);
        let app = outcome.result().unwrap().record("app").unwrap();
        assert_eq!(app.final_state, HealthVerdict::Failed);

        let (_root, orchestrator) =
            build(FakeRuntime::new(["db", "app"]), ScriptedProbeEngine::new());
        let outcome = orchestrator.run(&plan()).await.unwrap();
        assert_eq!(outcome.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_prepare_failure_aborts() {
        let (_root, orchestrator) =
            build(FakeRuntime::new(["db"]), ScriptedProbeEngine::new());

        let outcome = orchestrator.run(&plan()).await.unwrap();

        assert_eq!(outcome.exit_code(), 4);
        assert!(matches!(
            outcome,
            RunOutcome::Aborted { phase: RunPhase::Preparing, ref reason } if reason.contains("app")
        ));
        assert_eq!(orchestrator.phase(), RunPhase::Aborted);
    }

    #[tokio::test]
    async fn test_start_failure_aborts_before_probing() {
        let engine = ScriptedProbeEngine::new();
        let (_root, orchestrator) =
            build(FakeRuntime::new(["db", "app"]).failing_build(), engine);

        let outcome = orchestrator.run(&plan()).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                phase: RunPhase::Starting,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_rejected() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Succeed)
            .always(DB, ScriptStep::Succeed);
        let (_root, orchestrator) = build(FakeRuntime::new(["db", "app"]), engine);

        orchestrator.run(&plan()).await.unwrap();
        assert!(matches!(
            orchestrator.run(&plan()).await,
            Err(OrchestratorError::AlreadyRun)
        ));
    }

    #[test]
    fn test_exit_codes() {
        let now = chrono::Utc::now();
        let empty = DeploymentResult::aggregate(Default::default(), now, now);
        assert_eq!(RunOutcome::Reported(empty).exit_code(), 3);
        assert_eq!(
            RunOutcome::Aborted {
                phase: RunPhase::Starting,
                reason: "up failed".into()
            }
            .exit_code(),
            4
        );
    }
}
