//! Concurrent health verification of a whole plan.
//!
//! Every service is verified by its own task; a semaphore caps how many run
//! at once. Each task owns its service's history until it publishes a
//! terminal record, and every service is published exactly once. An
//! optional global deadline cancels all pending verifications, which then
//! conclude as `Failed` with `TIMEOUT_GLOBAL`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use keel_types::{DeploymentPlan, DeploymentResult, ServiceHealthRecord};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument, Span};

use crate::config::TrackerConfig;
use crate::error::HealthResult;
use crate::events::HealthEvent;
use crate::probes::ProbeEngine;
use crate::scheduler::RetryScheduler;

/// Verifies all services of a plan and aggregates the result.
pub struct HealthTracker {
    scheduler: Arc<RetryScheduler>,
    config: TrackerConfig,
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthTracker {
    pub fn new(engine: Arc<dyn ProbeEngine>, config: TrackerConfig) -> HealthResult<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(1024);
        let scheduler = RetryScheduler::new(engine).with_events(event_tx.clone());

        Ok(Self {
            scheduler: Arc::new(scheduler),
            config,
            event_tx,
        })
    }

    /// Subscribe to verification progress.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Verify every service in `plan` to a terminal record.
    ///
    /// Returns once every service has a record; never fails.
    #[instrument(skip_all, fields(services = plan.len()))]
    pub async fn run(&self, plan: &DeploymentPlan) -> DeploymentResult {
        let started_at = Utc::now();
        let pool_size = self.config.pool_size(plan.len());
        let cancel = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(pool_size));

        info!(pool_size, "Starting health verification");
        self.emit(HealthEvent::VerificationStarted {
            services: plan.len(),
            pool_size,
        });

        let mut tasks = JoinSet::new();
        for spec in plan.ordered_services() {
            let spec = spec.clone();
            let scheduler = Arc::clone(&self.scheduler);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();

            tasks.spawn(
                async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return ServiceHealthRecord::timed_out(spec, 0, Vec::new());
                        }
                        permit = permits.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return ServiceHealthRecord::timed_out(spec, 0, Vec::new()),
                        },
                    };
                    scheduler.verify_until_cancelled(&spec, &cancel).await
                }
                .instrument(Span::current()),
            );
        }

        // A deadline beyond the clock's range is the same as no deadline.
        let deadline = self
            .config
            .global_deadline
            .and_then(|d| Instant::now().checked_add(d));
        let mut records = BTreeMap::new();

        loop {
            let joined = match deadline {
                Some(at) if !cancel.is_cancelled() => {
                    tokio::select! {
                        joined = tasks.join_next() => joined,
                        _ = tokio::time::sleep_until(at) => {
                            let pending: Vec<String> = plan
                                .ordered_services()
                                .filter(|s| !records.contains_key(&s.name))
                                .map(|s| s.name.clone())
                                .collect();
                            warn!(?pending, "Global deadline exceeded, cancelling verification");
                            self.emit(HealthEvent::DeadlineExceeded { pending });
                            cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => tasks.join_next().await,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok(record) => publish(&mut records, record),
                Err(e) => error!(error = %e, "Verification task did not complete"),
            }
        }

        for spec in plan.ordered_services() {
            if !records.contains_key(&spec.name) {
                warn!(service = %spec.name, "No record published, marking failed");
                let record = if cancel.is_cancelled() {
                    ServiceHealthRecord::timed_out(spec.clone(), 0, Vec::new())
                } else {
                    ServiceHealthRecord::conclude(spec.clone(), 0, Vec::new())
                };
                records.insert(spec.name.clone(), record);
            }
        }

        let result = DeploymentResult::aggregate(records, started_at, Utc::now());
        info!(
            overall = %result.overall,
            duration_ms = result.duration().num_milliseconds(),
            "Health verification finished"
        );
        self.emit(HealthEvent::VerificationFinished {
            overall: result.overall,
        });

        result
    }

    fn emit(&self, event: HealthEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Insert a terminal record; later records for the same service are dropped.
fn publish(records: &mut BTreeMap<String, ServiceHealthRecord>, record: ServiceHealthRecord) {
    match records.entry(record.service.name.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(record);
        }
        Entry::Occupied(existing) => {
            warn!(service = %existing.key(), "Ignoring second record for service");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use keel_types::{ErrorKind, HealthVerdict, OverallVerdict, ProbeSpec, ServiceSpec};

    use super::*;
    use crate::probes::{ScriptStep, ScriptedProbeEngine};

    const APP: &str = "http://localhost:8080/actuator/health";
    const DB: &str = "localhost:3306";
    const CACHE: &str = "localhost:6379";

    fn app() -> ServiceSpec {
        ServiceSpec::new("app", ProbeSpec::http(APP, "UP"))
            .with_max_attempts(5)
            .with_retry_interval(Duration::from_secs(1))
    }

    fn db() -> ServiceSpec {
        ServiceSpec::new("db", ProbeSpec::tcp(DB))
            .with_max_attempts(3)
            .with_retry_interval(Duration::from_secs(1))
    }

    fn cache() -> ServiceSpec {
        ServiceSpec::new("cache", ProbeSpec::tcp(CACHE))
            .with_max_attempts(2)
            .with_retry_interval(Duration::from_secs(1))
    }

    fn tracker(engine: ScriptedProbeEngine, config: TrackerConfig) -> HealthTracker {
        HealthTracker::new(Arc::new(engine), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_healthy_is_success() {
        let engine = ScriptedProbeEngine::new()
            .script(APP, [ScriptStep::Fail(ErrorKind::ConnRefused)], ScriptStep::Succeed)
            .always(DB, ScriptStep::Succeed);
        let plan = DeploymentPlan::new(
            vec![
                app().with_max_attempts(2).with_retry_interval(Duration::ZERO),
                db().with_max_attempts(1),
            ],
            Vec::new(),
        )
        .unwrap();

        let result = tracker(engine, TrackerConfig::default()).run(&plan).await;

        assert_eq!(result.overall, OverallVerdict::Success);
        assert_eq!(result.record("app").unwrap().attempts_used, 2);
        assert_eq!(result.record("db").unwrap().attempts_used, 1);
        assert_eq!(result.records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_deadline_is_ignored() {
        let engine = ScriptedProbeEngine::new()
            .script(DB, [ScriptStep::Fail(ErrorKind::ConnRefused)], ScriptStep::Succeed);
        let plan = DeploymentPlan::new(vec![db()], Vec::new()).unwrap();
        let config = TrackerConfig::default().with_global_deadline(Duration::MAX);

        let result = tracker(engine, config).run(&plan).await;

        assert_eq!(result.overall, OverallVerdict::Success);
        assert_eq!(result.record("db").unwrap().attempts_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_verdicts_are_partial() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Succeed)
            .always(DB, ScriptStep::Succeed);
        let plan = DeploymentPlan::new(vec![app(), db(), cache()], Vec::new()).unwrap();

        let result = tracker(engine, TrackerConfig::default()).run(&plan).await;

        assert_eq!(result.overall, OverallVerdict::Partial);
        let cache = result.record("cache").unwrap();
        assert_eq!(cache.final_state, HealthVerdict::Failed);
        assert_eq!(cache.error, Some(ErrorKind::ConnRefused));
        assert_eq!(cache.attempts_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_is_failure() {
        let plan = DeploymentPlan::new(vec![db(), cache()], Vec::new()).unwrap();

        let result = tracker(ScriptedProbeEngine::new(), TrackerConfig::default())
            .run(&plan)
            .await;

        assert_eq!(result.overall, OverallVerdict::Failure);
        assert_eq!(result.count(HealthVerdict::Failed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_are_verified_concurrently() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Fail(ErrorKind::ConnRefused))
            .always(DB, ScriptStep::Fail(ErrorKind::ConnRefused));
        let plan = DeploymentPlan::new(
            vec![
                app().with_retry_interval(Duration::from_secs(10)),
                db().with_max_attempts(5).with_retry_interval(Duration::from_secs(10)),
            ],
            Vec::new(),
        )
        .unwrap();

        let started = Instant::now();
        tracker(engine, TrackerConfig::default()).run(&plan).await;

        // Each service alone needs 40s of backoff.
        assert!(started.elapsed() < Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_of_one_serialises_services() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Delayed(Duration::from_secs(2), Box::new(ScriptStep::Succeed)))
            .always(DB, ScriptStep::Delayed(Duration::from_secs(2), Box::new(ScriptStep::Succeed)))
            .always(CACHE, ScriptStep::Delayed(Duration::from_secs(2), Box::new(ScriptStep::Succeed)));
        let plan = DeploymentPlan::new(vec![app(), db(), cache()], Vec::new()).unwrap();

        let started = Instant::now();
        let result = tracker(engine, TrackerConfig::default().with_max_concurrency(1))
            .run(&plan)
            .await;

        assert_eq!(result.overall, OverallVerdict::Success);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_deadline_cancels_pending_services() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Succeed)
            .always(DB, ScriptStep::Fail(ErrorKind::ConnRefused));
        let plan = DeploymentPlan::new(
            vec![
                app(),
                db().with_max_attempts(10).with_retry_interval(Duration::from_secs(60)),
            ],
            Vec::new(),
        )
        .unwrap();
        let config = TrackerConfig::default().with_global_deadline(Duration::from_secs(5));
        let tracker = tracker(engine, config);
        let mut events = tracker.subscribe();

        let started = Instant::now();
        let result = tracker.run(&plan).await;

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(result.overall, OverallVerdict::Partial);
        assert!(result.record("app").unwrap().is_healthy());

        let db = result.record("db").unwrap();
        assert_eq!(db.final_state, HealthVerdict::Failed);
        assert_eq!(db.error, Some(ErrorKind::TimeoutGlobal));
        assert_eq!(db.attempts_used, 1);
        assert_eq!(db.history.len(), 1);

        let mut pending = None;
        while let Ok(event) = events.try_recv() {
            if let HealthEvent::DeadlineExceeded { pending: names } = event {
                pending = Some(names);
            }
        }
        assert_eq!(pending, Some(vec!["db".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_reaches_services_waiting_for_a_permit() {
        let engine = ScriptedProbeEngine::new()
            .always(APP, ScriptStep::Hang)
            .always(DB, ScriptStep::Hang);
        let plan = DeploymentPlan::new(vec![app(), db()], Vec::new()).unwrap();
        let config = TrackerConfig::default()
            .with_max_concurrency(1)
            .with_global_deadline(Duration::from_secs(3));

        let result = tracker(engine, config).run(&plan).await;

        assert_eq!(result.overall, OverallVerdict::Failure);
        for record in result.records.values() {
            assert_eq!(record.error, Some(ErrorKind::TimeoutGlobal));
        }
        // Only the service holding the single permit started an attempt.
        let attempts: u32 = result.records.values().map(|r| r.attempts_used).sum();
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_events() {
        let engine = ScriptedProbeEngine::new().always(DB, ScriptStep::Succeed);
        let plan = DeploymentPlan::new(vec![db()], Vec::new()).unwrap();
        let tracker = tracker(engine, TrackerConfig::default());
        let mut events = tracker.subscribe();

        tracker.run(&plan).await;

        let first = events.try_recv().unwrap();
        assert!(matches!(
            first,
            HealthEvent::VerificationStarted {
                services: 1,
                pool_size: 1
            }
        ));

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(HealthEvent::VerificationFinished {
                overall: OverallVerdict::Success
            })
        ));
    }

    #[test]
    fn test_publish_keeps_first_record() {
        let mut records = BTreeMap::new();
        let spec = db();

        publish(
            &mut records,
            ServiceHealthRecord::conclude(spec.clone(), 1, Vec::new()),
        );
        publish(
            &mut records,
            ServiceHealthRecord::timed_out(spec, 3, Vec::new()),
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records["db"].attempts_used, 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = HealthTracker::new(
            Arc::new(ScriptedProbeEngine::new()),
            TrackerConfig::default().with_max_concurrency(0),
        );
        assert!(result.is_err());
    }
}
