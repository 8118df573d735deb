//! Orchestrator configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! configuration file (TOML, YAML or JSON), then `KEEL_`-prefixed
//! environment variables. Nested keys use a double underscore, for example
//! `KEEL_COMPOSE__PROJECT_NAME=stack` or `KEEL_TRACKER__MAX_CONCURRENCY=4`.

use std::path::{Path, PathBuf};

use keel_health::TrackerConfig;
use serde::{Deserialize, Serialize};

/// Main orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Container runtime settings
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Preparation and startup settings
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Application build step; skipped when absent
    #[serde(default)]
    pub build: Option<BuildConfig>,

    /// Health verification settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Container runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Runtime executable
    #[serde(default = "default_compose_program")]
    pub program: String,

    /// Arguments placed before every runtime subcommand
    #[serde(default = "default_compose_args")]
    pub args: Vec<String>,

    /// Compose project file, relative to `project_dir`
    #[serde(default = "default_compose_file")]
    pub file: PathBuf,

    /// Directory the runtime runs in and relative paths resolve against
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Compose project name
    #[serde(default)]
    pub project_name: Option<String>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: default_compose_program(),
            args: default_compose_args(),
            file: default_compose_file(),
            project_dir: default_project_dir(),
            project_name: None,
        }
    }
}

/// Preparation and startup configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Files that must exist besides the compose file, e.g. a scrape config
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,

    /// Directories provisioned before startup
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,

    /// Build images without the runtime's layer cache
    #[serde(default)]
    pub no_cache: bool,
}

/// A runtime directory and its permission mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub path: PathBuf,

    /// Unix permission bits, e.g. `0o755`; ignored elsewhere
    #[serde(default)]
    pub mode: Option<u32>,
}

/// Application build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build executable
    #[serde(default = "default_build_program")]
    pub program: String,

    /// Build arguments
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,

    /// Extra arguments appended when tests are skipped
    #[serde(default = "default_skip_tests_args")]
    pub skip_tests_args: Vec<String>,

    /// Source directory, relative to the project directory
    #[serde(default = "default_project_dir")]
    pub source_dir: PathBuf,

    /// Artifact produced by the build, relative to `source_dir`
    #[serde(default = "default_build_artifact")]
    pub artifact: PathBuf,

    /// Skip the test phase of the build
    #[serde(default)]
    pub skip_tests: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            args: default_build_args(),
            skip_tests_args: default_skip_tests_args(),
            source_dir: default_project_dir(),
            artifact: default_build_artifact(),
            skip_tests: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_compose_program() -> String {
    "docker".to_string()
}

fn default_compose_args() -> Vec<String> {
    vec!["compose".to_string()]
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_program() -> String {
    "mvn".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["-B".to_string(), "package".to_string()]
}

fn default_skip_tests_args() -> Vec<String> {
    vec!["-DskipTests".to_string()]
}

fn default_build_artifact() -> PathBuf {
    PathBuf::from("target/app.jar")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl OrchestratorConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&OrchestratorConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // Add environment variables with KEEL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("KEEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Resolve `path` against the project directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.compose.project_dir.join(path)
    }

    /// Compose file path resolved against the project directory.
    pub fn compose_file(&self) -> PathBuf {
        self.resolve(&self.compose.file)
    }
}
