//! Deployment error types
//!
//! Everything here is fatal for the run it occurs in and is never retried.
//! Probe failures are not errors; they only degrade health verdicts.

use std::path::PathBuf;

use thiserror::Error;

use crate::orchestrator::RunPhase;

/// Failure of an external container runtime command.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected runtime output: {0}")]
    InvalidOutput(String),
}

/// Container images could not be built.
#[derive(Debug, Error)]
#[error("image build failed: {0}")]
pub struct ImageBuildError(#[from] pub RuntimeError);

/// The build tool could not produce a deployable artifact.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to run build tool `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build tool `{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("build finished but artifact {} does not exist", path.display())]
    MissingArtifact { path: PathBuf },
}

/// Preparation failed; nothing was started.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("required artifact {} is missing", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("container runtime rejected {}: {source}", path.display())]
    RuntimeConfig {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error("service '{service}' is not declared in {}", path.display())]
    UndeclaredService { service: String, path: PathBuf },

    #[error("failed to provision {}: {source}", path.display())]
    Provision {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Starting the stack failed.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    ImageBuild(#[from] ImageBuildError),

    #[error("failed to start services: {0}")]
    Up(#[source] RuntimeError),

    #[error("failed to query service status: {0}")]
    Status(#[source] RuntimeError),

    #[error("service '{service}' is not running (status: {status})")]
    NotStarted { service: String, status: String },
}

/// Misuse of the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator has already run; create a new instance per run")]
    AlreadyRun,

    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: RunPhase, to: RunPhase },
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
