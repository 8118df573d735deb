//! Deployment results

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{HealthVerdict, ServiceHealthRecord};

/// Verdict for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallVerdict {
    Success,
    Partial,
    Failure,
}

impl OverallVerdict {
    /// `Success` iff every verdict is healthy, `Failure` iff every verdict is
    /// failed (or there is nothing to judge), `Partial` otherwise.
    pub fn from_verdicts<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = HealthVerdict>,
    {
        let mut total = 0usize;
        let mut healthy = 0usize;
        let mut failed = 0usize;

        for verdict in verdicts {
            total += 1;
            match verdict {
                HealthVerdict::Healthy => healthy += 1,
                HealthVerdict::Failed => failed += 1,
                HealthVerdict::Degraded => {}
            }
        }

        if total == 0 || failed == total {
            OverallVerdict::Failure
        } else if healthy == total {
            OverallVerdict::Success
        } else {
            OverallVerdict::Partial
        }
    }
}

impl fmt::Display for OverallVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallVerdict::Success => write!(f, "SUCCESS"),
            OverallVerdict::Partial => write!(f, "PARTIAL"),
            OverallVerdict::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Aggregated outcome of one verification phase. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Record per service name
    pub records: BTreeMap<String, ServiceHealthRecord>,

    /// Overall verdict derived from `records`
    pub overall: OverallVerdict,

    /// Verification start
    pub started_at: DateTime<Utc>,

    /// Verification end
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    /// Aggregate final records into a result.
    pub fn aggregate(
        records: BTreeMap<String, ServiceHealthRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let overall = OverallVerdict::from_verdicts(records.values().map(|r| r.final_state));
        Self {
            records,
            overall,
            started_at,
            finished_at,
        }
    }

    pub fn record(&self, service: &str) -> Option<&ServiceHealthRecord> {
        self.records.get(service)
    }

    pub fn count(&self, verdict: HealthVerdict) -> usize {
        self.records
            .values()
            .filter(|r| r.final_state == verdict)
            .count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HealthVerdict::*;

    #[test]
    fn test_overall_verdict_table() {
        assert_eq!(
            OverallVerdict::from_verdicts([Healthy, Healthy, Healthy]),
            OverallVerdict::Success
        );
        assert_eq!(
            OverallVerdict::from_verdicts([Healthy, Healthy, Failed]),
            OverallVerdict::Partial
        );
        assert_eq!(
            OverallVerdict::from_verdicts([Failed, Failed]),
            OverallVerdict::Failure
        );
        assert_eq!(
            OverallVerdict::from_verdicts([Degraded, Failed]),
            OverallVerdict::Partial
        );
        assert_eq!(
            OverallVerdict::from_verdicts([Degraded]),
            OverallVerdict::Partial
        );
        assert_eq!(OverallVerdict::from_verdicts([]), OverallVerdict::Failure);
    }

    #[test]
    fn test_verdicts_serialize_in_screaming_case() {
        let json = serde_json::to_string(&OverallVerdict::Partial).unwrap();
        assert_eq!(json, "\"PARTIAL\"");
        let json = serde_json::to_string(&Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
    }
}
