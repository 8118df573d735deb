//! Probe engine: single health checks against one endpoint.
//!
//! A probe is executed exactly once per call. It never retries and never
//! fails with an error: every transport fault is folded into a
//! [`ProbeOutcome`] carrying a classified [`ErrorKind`]. Retry policy belongs
//! to the [`RetryScheduler`](crate::scheduler::RetryScheduler).

mod http;
#[cfg(any(test, feature = "test-utils"))]
mod scripted;
mod tcp;

pub use http::HttpProbe;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptStep, ScriptedProbeEngine};
pub use tcp::TcpProbe;

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use keel_types::{ErrorKind, ProbeKind, ProbeOutcome, ProbeRole, ProbeSpec};

use crate::error::HealthResult;

/// Executes a single probe and classifies the outcome.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    /// Probe `spec` once.
    ///
    /// `connect_timeout` bounds connection establishment; `request_timeout`
    /// bounds a full HTTP exchange including the body.
    async fn probe(
        &self,
        spec: &ProbeSpec,
        role: ProbeRole,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ProbeOutcome;

    /// Engine name for logging.
    fn name(&self) -> &str {
        "probe-engine"
    }
}

/// Probe engine that talks to real endpoints over the network.
pub struct NetworkProbeEngine {
    http: HttpProbe,
    tcp: TcpProbe,
}

impl NetworkProbeEngine {
    pub fn new() -> HealthResult<Self> {
        Ok(Self {
            http: HttpProbe::new()?,
            tcp: TcpProbe::new(),
        })
    }
}

#[async_trait]
impl ProbeEngine for NetworkProbeEngine {
    async fn probe(
        &self,
        spec: &ProbeSpec,
        role: ProbeRole,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ProbeOutcome {
        match spec.kind {
            ProbeKind::HttpBodyContains => {
                self.http
                    .execute(spec, role, connect_timeout, request_timeout)
                    .await
            }
            ProbeKind::TcpConnect => self.tcp.execute(spec, role, connect_timeout).await,
        }
    }

    fn name(&self) -> &str {
        "network"
    }
}

/// Classify an I/O error by kind.
pub(crate) fn classify_io(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorKind::ConnRefused,
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        _ => ErrorKind::Transport,
    }
}

/// Walk an error chain looking for a recognisable transport cause.
pub(crate) fn classify_chain(err: &(dyn StdError + 'static)) -> ErrorKind {
    let mut current = Some(err);

    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            let kind = classify_io(io_err);
            if kind != ErrorKind::Transport {
                return kind;
            }
        }

        let text = e.to_string().to_ascii_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return ErrorKind::DnsFail;
        }
        if text.contains("connection refused") {
            return ErrorKind::ConnRefused;
        }
        if text.contains("timed out") {
            return ErrorKind::Timeout;
        }

        current = e.source();
    }

    ErrorKind::Transport
}
