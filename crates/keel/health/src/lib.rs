//! # Keel Health - Bounded health verification for deployed stacks
//!
//! After containers are started, every service in a
//! [`DeploymentPlan`](keel_types::DeploymentPlan) is probed until it is
//! healthy or its attempt budget runs out. Services are verified
//! concurrently; each one yields exactly one
//! [`ServiceHealthRecord`](keel_types::ServiceHealthRecord).
//!
//! ## Key Components
//!
//! - [`probes`]: single HTTP body and TCP connect probes behind [`ProbeEngine`]
//! - [`RetryScheduler`]: per-service retry loop with same-attempt fallback
//! - [`HealthTracker`]: bounded worker pool, global deadline and aggregation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel_health::{HealthTracker, NetworkProbeEngine, TrackerConfig};
//! use keel_types::DeploymentPlan;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = DeploymentPlan::from_path("keel.plan.yaml")?;
//! let engine = Arc::new(NetworkProbeEngine::new()?);
//! let tracker = HealthTracker::new(engine, TrackerConfig::default())?;
//!
//! let result = tracker.run(&plan).await;
//! println!("Overall: {}", result.overall);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod events;
pub mod probes;
pub mod scheduler;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{HealthError, HealthResult};
pub use events::HealthEvent;
pub use probes::{HttpProbe, NetworkProbeEngine, ProbeEngine, TcpProbe};
pub use scheduler::RetryScheduler;
pub use tracker::HealthTracker;
