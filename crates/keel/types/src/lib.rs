//! Keel Types - Core types for stack deployment and health verification
//!
//! Keel brings an application stack (application, datastore, observability
//! services) to a running state through an external container runtime and
//! then verifies, with bounded and fallback-aware probing, that every service
//! is actually usable.
//!
//! ## Key Concepts
//!
//! - **ServiceSpec**: One logical service and how to probe it
//! - **ProbeSpec**: A description of how to ask an endpoint whether it is healthy
//! - **DeploymentPlan**: The validated set of services plus their startup order
//! - **ProbeOutcome**: The result of a single probe attempt
//! - **ServiceHealthRecord**: Per-service verdict and attempt history
//! - **DeploymentResult**: Aggregated verdict for one run

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod outcome;
pub mod plan;
pub mod record;
pub mod result;
pub mod service;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use outcome::{ErrorKind, ProbeOutcome, ProbeRole};
pub use plan::{DeploymentPlan, PlanFile};
pub use record::{HealthVerdict, ServiceHealthRecord};
pub use result::{DeploymentResult, OverallVerdict};
pub use service::{PatternMatcher, ProbeKind, ProbeSpec, ServiceSpec, SuccessPattern};
