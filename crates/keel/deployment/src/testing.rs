//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::build::BuildTool;
use crate::error::{BuildError, ImageBuildError, RuntimeError};
use crate::runtime::{ContainerRuntime, ServiceStatus};

fn failure(command: &str) -> RuntimeError {
    RuntimeError::CommandFailed {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: "simulated failure".to_string(),
    }
}

/// Runtime that records calls and reports every declared service as running.
#[derive(Default)]
pub struct FakeRuntime {
    declared: Vec<String>,
    statuses: HashMap<String, String>,
    fail_validate: bool,
    fail_teardown: bool,
    fail_build: bool,
    fail_up: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new<I, S>(declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: declared.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, service: &str, status: &str) -> Self {
        self.statuses.insert(service.to_string(), status.to_string());
        self
    }

    pub fn failing_validate(mut self) -> Self {
        self.fail_validate = true;
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn validate_config(&self, _path: &Path) -> Result<Vec<String>, RuntimeError> {
        self.record("validate_config".into());
        if self.fail_validate {
            return Err(failure("config"));
        }
        Ok(self.declared.clone())
    }

    async fn teardown(&self, services: &[String]) -> Result<(), RuntimeError> {
        self.record(format!("teardown {}", services.join(" ")));
        if self.fail_teardown {
            return Err(failure("rm"));
        }
        Ok(())
    }

    async fn build_images(&self, no_cache: bool) -> Result<(), ImageBuildError> {
        self.record(if no_cache {
            "build_images --no-cache".into()
        } else {
            "build_images".into()
        });
        if self.fail_build {
            return Err(failure("build").into());
        }
        Ok(())
    }

    async fn up(&self, detached: bool) -> Result<(), RuntimeError> {
        self.record(if detached { "up -d".into() } else { "up".into() });
        if self.fail_up {
            return Err(failure("up"));
        }
        Ok(())
    }

    async fn ps(&self) -> Result<Vec<ServiceStatus>, RuntimeError> {
        self.record("ps".into());
        Ok(self
            .declared
            .iter()
            .map(|name| {
                let status = self
                    .statuses
                    .get(name)
                    .map(String::as_str)
                    .unwrap_or("running");
                ServiceStatus::new(name.as_str(), status)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Build tool that records `skip_tests` for every build.
pub struct FakeBuildTool {
    succeed: bool,
    builds: Mutex<Vec<bool>>,
}

impl FakeBuildTool {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn builds(&self) -> Vec<bool> {
        self.builds.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BuildTool for FakeBuildTool {
    async fn build(&self, source_dir: &Path, skip_tests: bool) -> Result<PathBuf, BuildError> {
        if let Ok(mut builds) = self.builds.lock() {
            builds.push(skip_tests);
        }
        if self.succeed {
            Ok(source_dir.join("target/app.jar"))
        } else {
            Err(BuildError::Failed {
                program: "fake".into(),
                status: "exit status: 1".into(),
                stderr: "compilation error".into(),
            })
        }
    }
}
