//! Container runtime collaborator
//!
//! The orchestrator never parses compose files or talks to a container
//! daemon itself. It asks a [`ContainerRuntime`] for declared service names,
//! for teardown, image builds and startup, and for service status.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ComposeConfig;
use crate::error::{ImageBuildError, RuntimeError};

/// Runtime status of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: String,
}

impl ServiceStatus {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }

    /// Whether the runtime reports the service as started.
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

/// Operations the lifecycle controller needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Validate the project file and return the declared service names.
    async fn validate_config(&self, path: &Path) -> Result<Vec<String>, RuntimeError>;

    /// Stop and remove the given services. Callers treat failures as non-fatal.
    async fn teardown(&self, services: &[String]) -> Result<(), RuntimeError>;

    /// Build container images.
    async fn build_images(&self, no_cache: bool) -> Result<(), ImageBuildError>;

    /// Start all services.
    async fn up(&self, detached: bool) -> Result<(), RuntimeError>;

    /// Current status of every service.
    async fn ps(&self) -> Result<Vec<ServiceStatus>, RuntimeError>;

    /// Runtime name for logging
    fn name(&self) -> &str;
}

/// Runtime driving the `docker compose` command line.
pub struct ComposeRuntime {
    program: String,
    base_args: Vec<String>,
    compose_file: PathBuf,
    project_dir: PathBuf,
    project_name: Option<String>,
}

impl ComposeRuntime {
    pub fn new(config: &ComposeConfig) -> Self {
        Self {
            program: config.program.clone(),
            base_args: config.args.clone(),
            compose_file: config.file.clone(),
            project_dir: config.project_dir.clone(),
            project_name: config.project_name.clone(),
        }
    }

    fn command(&self, compose_file: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg("-f")
            .arg(compose_file)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(project) = &self.project_name {
            command.arg("-p").arg(project);
        }
        command
    }

    async fn exec(&self, compose_file: &Path, args: &[&str]) -> Result<String, RuntimeError> {
        let rendered = format!("{} {}", self.program, args.join(" "));
        debug!(command = %rendered, "Running container runtime command");

        let output = self
            .command(compose_file)
            .args(args)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    #[instrument(skip(self))]
    async fn validate_config(&self, path: &Path) -> Result<Vec<String>, RuntimeError> {
        let stdout = self.exec(path, &["config", "--services"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip(self))]
    async fn teardown(&self, services: &[String]) -> Result<(), RuntimeError> {
        let mut args = vec!["rm", "--stop", "--force", "-v"];
        args.extend(services.iter().map(String::as_str));
        self.exec(&self.compose_file, &args).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn build_images(&self, no_cache: bool) -> Result<(), ImageBuildError> {
        let args: &[&str] = if no_cache {
            &["build", "--no-cache"]
        } else {
            &["build"]
        };
        self.exec(&self.compose_file, args).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn up(&self, detached: bool) -> Result<(), RuntimeError> {
        let args: &[&str] = if detached { &["up", "-d"] } else { &["up"] };
        self.exec(&self.compose_file, args).await.map(|_| ())
    }

    async fn ps(&self) -> Result<Vec<ServiceStatus>, RuntimeError> {
        let stdout = self
            .exec(&self.compose_file, &["ps", "--all", "--format", "json"])
            .await?;
        parse_ps(&stdout)
    }

    fn name(&self) -> &str {
        "compose"
    }
}

#[derive(Deserialize)]
struct PsEntry {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State")]
    state: String,
}

/// Parse `ps --format json` output, either a JSON array or one object per line.
fn parse_ps(stdout: &str) -> Result<Vec<ServiceStatus>, RuntimeError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| RuntimeError::InvalidOutput(e.to_string()))?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()
            .map_err(|e| RuntimeError::InvalidOutput(e.to_string()))?
    };

    Ok(entries
        .into_iter()
        .map(|e| ServiceStatus::new(e.service, e.state))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_line_delimited() {
        let stdout = concat!(
            r#"{"Name":"stack-db-1","Service":"db","State":"running","Health":""}"#,
            "\n",
            r#"{"Name":"stack-app-1","Service":"app","State":"exited","ExitCode":1}"#,
            "\n"
        );
        let statuses = parse_ps(stdout).unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_running());
        assert_eq!(statuses[1], ServiceStatus::new("app", "exited"));
        assert!(!statuses[1].is_running());
    }

    #[test]
    fn test_parse_ps_array() {
        let stdout = r#"[{"Service":"db","State":"running"},{"Service":"app","State":"running"}]"#;
        let statuses = parse_ps(stdout).unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(ServiceStatus::is_running));
    }

    #[test]
    fn test_parse_ps_rejects_garbage() {
        assert!(parse_ps("").unwrap().is_empty());
        assert!(matches!(
            parse_ps("NAME IMAGE STATUS"),
            Err(RuntimeError::InvalidOutput(_))
        ));
    }

    #[cfg(unix)]
    fn scripted(script: &str) -> ComposeRuntime {
        ComposeRuntime::new(&ComposeConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "compose".into()],
            ..ComposeConfig::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validate_config_reads_service_names() {
        let runtime = scripted("printf 'db\\n\\napp\\nprometheus\\n'");
        let services = runtime
            .validate_config(Path::new("docker-compose.yml"))
            .await
            .unwrap();
        assert_eq!(services, ["db", "app", "prometheus"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let runtime = scripted("echo 'no such service: cache' >&2; exit 3");
        let err = runtime.up(true).await.unwrap_err();
        match err {
            RuntimeError::CommandFailed { stderr, .. } => {
                assert_eq!(stderr, "no such service: cache")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runtime = ComposeRuntime::new(&ComposeConfig {
            program: "keel-no-such-runtime".into(),
            ..ComposeConfig::default()
        });
        assert!(matches!(
            runtime.ps().await,
            Err(RuntimeError::Spawn { .. })
        ));
    }
}
