//! TCP connect probe.

use std::net::SocketAddr;
use std::time::Duration;

use keel_types::{ErrorKind, ProbeOutcome, ProbeRole, ProbeSpec};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::classify_io;

/// Probe that succeeds when a TCP connection can be established.
///
/// The connection is closed immediately; nothing is sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, spec), fields(target = %spec.target))]
    pub async fn execute(
        &self,
        spec: &ProbeSpec,
        role: ProbeRole,
        connect_timeout: Duration,
    ) -> ProbeOutcome {
        let start = Instant::now();

        let address = match spec.tcp_address() {
            Ok(address) => address,
            Err(reason) => {
                return ProbeOutcome::failure(role, ErrorKind::Transport, reason, start.elapsed())
            }
        };

        let outcome = match tokio::time::timeout(connect_timeout, connect(&address)).await {
            Err(_) => ProbeOutcome::failure(
                role,
                ErrorKind::Timeout,
                format!("no connection to {address} within {connect_timeout:?}"),
                start.elapsed(),
            ),
            Ok(Err((kind, detail))) => ProbeOutcome::failure(role, kind, detail, start.elapsed()),
            Ok(Ok(peer)) => {
                debug!(%peer, "TCP connection established");
                ProbeOutcome::success(role, start.elapsed())
            }
        };

        debug!(
            succeeded = outcome.succeeded,
            error = ?outcome.error,
            latency_ms = outcome.observed_latency.as_millis() as u64,
            "TCP probe finished"
        );

        outcome
    }
}

/// Resolve `address` and connect to the first reachable socket address.
async fn connect(address: &str) -> Result<SocketAddr, (ErrorKind, String)> {
    let addrs: Vec<SocketAddr> = lookup_host(address)
        .await
        .map_err(|e| (ErrorKind::DnsFail, format!("{address}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err((
            ErrorKind::DnsFail,
            format!("{address}: no addresses resolved"),
        ));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(_stream) => return Ok(addr),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.map_or_else(
        || (ErrorKind::Transport, format!("{address}: connection failed")),
        |e| (classify_io(&e), format!("{address}: {e}")),
    ))
}
