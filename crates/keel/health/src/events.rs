//! Events emitted during health verification.

use keel_types::{HealthVerdict, OverallVerdict, ProbeOutcome};

/// Progress of a verification phase, broadcast to observers.
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// Verification of a plan started.
    VerificationStarted { services: usize, pool_size: usize },

    /// A single probe completed.
    AttemptCompleted {
        service: String,
        attempt: u32,
        outcome: ProbeOutcome,
    },

    /// A service reached a terminal verdict.
    ServiceVerified {
        service: String,
        verdict: HealthVerdict,
        attempts_used: u32,
    },

    /// The global deadline fired; pending services are being cancelled.
    DeadlineExceeded { pending: Vec<String> },

    /// Every service has a terminal record.
    VerificationFinished { overall: OverallVerdict },
}
