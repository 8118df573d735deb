//! Scripted probe engine for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use keel_types::{ErrorKind, ProbeOutcome, ProbeRole, ProbeSpec};

use super::ProbeEngine;

/// What a scripted probe does when called.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Succeed immediately.
    Succeed,
    /// Fail immediately with the given kind.
    Fail(ErrorKind),
    /// Never answer.
    Hang,
    /// Wait, then perform the inner step.
    Delayed(Duration, Box<ScriptStep>),
}

#[derive(Debug)]
struct Script {
    steps: VecDeque<ScriptStep>,
    then: ScriptStep,
    calls: usize,
}

/// Probe engine answering from per-target scripts.
///
/// Targets without a script fail with [`ErrorKind::ConnRefused`].
#[derive(Debug, Default)]
pub struct ScriptedProbeEngine {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedProbeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `target` with `steps` in order, then with `then` forever.
    pub fn script(
        self,
        target: impl Into<String>,
        steps: impl IntoIterator<Item = ScriptStep>,
        then: ScriptStep,
    ) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(
                target.into(),
                Script {
                    steps: steps.into_iter().collect(),
                    then,
                    calls: 0,
                },
            );
        }
        self
    }

    /// Answer `target` with the same step on every call.
    pub fn always(self, target: impl Into<String>, step: ScriptStep) -> Self {
        self.script(target, [], step)
    }

    /// Number of probes executed against `target`.
    pub fn calls(&self, target: &str) -> usize {
        self.scripts
            .lock()
            .ok()
            .and_then(|scripts| scripts.get(target).map(|s| s.calls))
            .unwrap_or(0)
    }

    fn next_step(&self, target: &str) -> ScriptStep {
        let Ok(mut scripts) = self.scripts.lock() else {
            return ScriptStep::Fail(ErrorKind::Transport);
        };
        match scripts.get_mut(target) {
            Some(script) => {
                script.calls += 1;
                script
                    .steps
                    .pop_front()
                    .unwrap_or_else(|| script.then.clone())
            }
            None => ScriptStep::Fail(ErrorKind::ConnRefused),
        }
    }
}

#[async_trait]
impl ProbeEngine for ScriptedProbeEngine {
    async fn probe(
        &self,
        spec: &ProbeSpec,
        role: ProbeRole,
        _connect_timeout: Duration,
        _request_timeout: Duration,
    ) -> ProbeOutcome {
        let mut step = self.next_step(&spec.target);
        let mut latency = Duration::ZERO;

        loop {
            match step {
                ScriptStep::Succeed => return ProbeOutcome::success(role, latency),
                ScriptStep::Fail(kind) => {
                    return ProbeOutcome::failure(role, kind, "scripted failure", latency)
                }
                ScriptStep::Hang => return std::future::pending().await,
                ScriptStep::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    latency += delay;
                    step = *inner;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
