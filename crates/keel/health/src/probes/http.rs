//! HTTP body probe.
//!
//! Issues a GET against the probe target and checks the response body
//! against the success pattern. The status code is not inspected: a body
//! that matches is a success even on a non-2xx response, and a body that
//! does not match is a [`ErrorKind::BadResponse`].

use std::time::Duration;

use dashmap::DashMap;
use keel_types::{ErrorKind, PatternMatcher, ProbeOutcome, ProbeRole, ProbeSpec, SuccessPattern};
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::classify_chain;
use crate::error::HealthResult;

/// Probe that fetches a URL and matches its body.
///
/// Clients are cached per connect timeout so connection pools are reused
/// across attempts. Success patterns are compiled once per pattern.
pub struct HttpProbe {
    clients: DashMap<Duration, Client>,
    matchers: DashMap<Option<SuccessPattern>, PatternMatcher>,
}

impl HttpProbe {
    pub fn new() -> HealthResult<Self> {
        let probe = Self {
            clients: DashMap::new(),
            matchers: DashMap::new(),
        };
        // Fail early if the TLS backend cannot be initialised.
        probe.client(Duration::from_secs(3))?;
        Ok(probe)
    }

    fn client(&self, connect_timeout: Duration) -> HealthResult<Client> {
        if let Some(client) = self.clients.get(&connect_timeout) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()?;
        self.clients.insert(connect_timeout, client.clone());
        Ok(client)
    }

    fn matcher(&self, spec: &ProbeSpec) -> Result<PatternMatcher, String> {
        if let Some(matcher) = self.matchers.get(&spec.success_pattern) {
            return Ok(matcher.clone());
        }

        let matcher = spec.matcher().map_err(|e| e.to_string())?;
        self.matchers
            .insert(spec.success_pattern.clone(), matcher.clone());
        Ok(matcher)
    }

    #[instrument(skip(self, spec), fields(target = %spec.target))]
    pub async fn execute(
        &self,
        spec: &ProbeSpec,
        role: ProbeRole,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ProbeOutcome {
        let start = Instant::now();

        let matcher = match self.matcher(spec) {
            Ok(matcher) => matcher,
            Err(e) => {
                return ProbeOutcome::failure(
                    role,
                    ErrorKind::Transport,
                    format!("invalid success pattern: {e}"),
                    start.elapsed(),
                )
            }
        };

        let client = match self.client(connect_timeout) {
            Ok(client) => client,
            Err(e) => {
                return ProbeOutcome::failure(
                    role,
                    ErrorKind::Transport,
                    e.to_string(),
                    start.elapsed(),
                )
            }
        };

        let exchange = async {
            let response = client.get(&spec.target).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let outcome = match tokio::time::timeout(request_timeout, exchange).await {
            Err(_) => ProbeOutcome::failure(
                role,
                ErrorKind::Timeout,
                format!("no complete response within {request_timeout:?}"),
                start.elapsed(),
            ),
            Ok(Err(e)) => {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    classify_chain(&e)
                };
                ProbeOutcome::failure(role, kind, e.to_string(), start.elapsed())
            }
            Ok(Ok((_, body))) if matcher.is_match(&body) => {
                ProbeOutcome::success(role, start.elapsed())
            }
            Ok(Ok((status, body))) => ProbeOutcome::failure(
                role,
                ErrorKind::BadResponse,
                format!(
                    "HTTP {status}: body of {} bytes did not match expected pattern",
                    body.len()
                ),
                start.elapsed(),
            ),
        };

        debug!(
            succeeded = outcome.succeeded,
            error = ?outcome.error,
            latency_ms = outcome.observed_latency.as_millis() as u64,
            "HTTP probe finished"
        );

        outcome
    }
}
