//! Build tool collaborator

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument};

use crate::config::BuildConfig;
use crate::error::BuildError;

/// Produces the deployable application artifact from source.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Build `source_dir` and return the artifact path.
    async fn build(&self, source_dir: &Path, skip_tests: bool) -> Result<PathBuf, BuildError>;
}

/// Build tool that runs a configured command, for example `mvn package`.
pub struct CommandBuildTool {
    program: String,
    args: Vec<String>,
    skip_tests_args: Vec<String>,
    artifact: PathBuf,
}

impl CommandBuildTool {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            skip_tests_args: config.skip_tests_args.clone(),
            artifact: config.artifact.clone(),
        }
    }
}

#[async_trait]
impl BuildTool for CommandBuildTool {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn build(&self, source_dir: &Path, skip_tests: bool) -> Result<PathBuf, BuildError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(source_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if skip_tests {
            command.args(&self.skip_tests_args);
        }

        let output = command.output().await.map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BuildError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let artifact = source_dir.join(&self.artifact);
        if !artifact.exists() {
            return Err(BuildError::MissingArtifact { path: artifact });
        }

        info!(artifact = %artifact.display(), "Build finished");
        Ok(artifact)
    }
}
