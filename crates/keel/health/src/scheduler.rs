//! Bounded retry scheduling for a single service.
//!
//! Each attempt runs the primary probe. When it fails and the service has a
//! fallback, the fallback runs within the same attempt and consumes no extra
//! budget. The scheduler sleeps `retry_interval` between attempts and never
//! after the last one.

use std::sync::Arc;

use keel_types::{ProbeOutcome, ProbeRole, ProbeSpec, ServiceHealthRecord, ServiceSpec};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::HealthEvent;
use crate::probes::ProbeEngine;

/// Drives the probe engine for one service until it is healthy, its attempt
/// budget runs out, or verification is cancelled.
pub struct RetryScheduler {
    engine: Arc<dyn ProbeEngine>,
    event_tx: Option<broadcast::Sender<HealthEvent>>,
}

impl RetryScheduler {
    pub fn new(engine: Arc<dyn ProbeEngine>) -> Self {
        Self {
            engine,
            event_tx: None,
        }
    }

    /// Publish attempt progress on `event_tx`.
    pub fn with_events(mut self, event_tx: broadcast::Sender<HealthEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Verify `spec` to a terminal record.
    pub async fn verify(&self, spec: &ServiceSpec) -> ServiceHealthRecord {
        self.verify_until_cancelled(spec, &CancellationToken::new())
            .await
    }

    /// Verify `spec`, giving up as soon as `cancel` fires.
    ///
    /// A cancelled verification yields a `Failed` record with
    /// `TIMEOUT_GLOBAL` and the history collected so far. No further probe
    /// is started once the token is cancelled.
    #[instrument(skip_all, fields(service = %spec.name, max_attempts = spec.max_attempts))]
    pub async fn verify_until_cancelled(
        &self,
        spec: &ServiceSpec,
        cancel: &CancellationToken,
    ) -> ServiceHealthRecord {
        let mut history = Vec::new();
        let mut attempt = 0;

        while attempt < spec.max_attempts {
            attempt += 1;

            let Some(outcome) = self
                .run_probe(spec, &spec.primary_probe, ProbeRole::Primary, attempt, cancel)
                .await
            else {
                return self.cancelled(spec, attempt, history);
            };
            let succeeded = outcome.succeeded;
            history.push(outcome);
            if succeeded {
                return self.conclude(spec, attempt, history);
            }

            if let Some(fallback) = &spec.fallback_probe {
                debug!(attempt, "Primary probe failed, trying fallback");
                let Some(outcome) = self
                    .run_probe(spec, fallback, ProbeRole::Fallback, attempt, cancel)
                    .await
                else {
                    return self.cancelled(spec, attempt, history);
                };
                let succeeded = outcome.succeeded;
                history.push(outcome);
                if succeeded {
                    return self.conclude(spec, attempt, history);
                }
            }

            if attempt < spec.max_attempts {
                debug!(
                    attempt,
                    retry_in_ms = spec.retry_interval.as_millis() as u64,
                    "Service not ready yet"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.cancelled(spec, attempt, history),
                    _ = tokio::time::sleep(spec.retry_interval) => {}
                }
            }
        }

        self.conclude(spec, attempt, history)
    }

    async fn run_probe(
        &self,
        spec: &ServiceSpec,
        probe: &ProbeSpec,
        role: ProbeRole,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Option<ProbeOutcome> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            outcome = self.engine.probe(probe, role, spec.connect_timeout, spec.request_timeout) => outcome,
        };

        debug!(
            attempt,
            role = %role,
            succeeded = outcome.succeeded,
            error = ?outcome.error,
            "Probe completed"
        );
        self.emit(HealthEvent::AttemptCompleted {
            service: spec.name.clone(),
            attempt,
            outcome: outcome.clone(),
        });

        Some(outcome)
    }

    fn conclude(
        &self,
        spec: &ServiceSpec,
        attempts: u32,
        history: Vec<ProbeOutcome>,
    ) -> ServiceHealthRecord {
        let record = ServiceHealthRecord::conclude(spec.clone(), attempts, history);
        if record.is_healthy() {
            info!(attempts = record.attempts_used, "Service healthy");
        } else {
            warn!(
                attempts = record.attempts_used,
                verdict = ?record.final_state,
                error = ?record.error,
                "Service did not become healthy"
            );
        }
        self.finish(record)
    }

    fn cancelled(
        &self,
        spec: &ServiceSpec,
        attempts: u32,
        history: Vec<ProbeOutcome>,
    ) -> ServiceHealthRecord {
        warn!(attempts, "Verification cancelled by global deadline");
        self.finish(ServiceHealthRecord::timed_out(spec.clone(), attempts, history))
    }

    fn finish(&self, record: ServiceHealthRecord) -> ServiceHealthRecord {
        self.emit(HealthEvent::ServiceVerified {
            service: record.service.name.clone(),
            verdict: record.final_state,
            attempts_used: record.attempts_used,
        });
        record
    }

    fn emit(&self, event: HealthEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
