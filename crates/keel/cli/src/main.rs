//! Keel CLI - Deploy an application stack and verify it is usable
//!
//! Commands:
//! - `deploy`: prepare, start and verify the stack described by a plan
//! - `verify`: probe an already running stack
//! - `validate`: check a plan without side effects
//! - `config`: show the effective configuration
//!
//! Exit status: 0 success, 1 configuration or usage error, 2 partial,
//! 3 failure, 4 aborted.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keel_deployment::{LoggingConfig, OrchestratorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use commands::{deploy, validate, verify};
use error::{CliError, CliResult};
use output::{print_error, OutputFormat};

/// Keel CLI application
#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Keel - Deploy an application stack and verify it is healthy", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "KEEL_LOG_JSON")]
    log_json: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Prepare, start and verify the stack
    Deploy(deploy::DeployArgs),

    /// Verify an already running stack
    Verify(verify::VerifyArgs),

    /// Validate a deployment plan
    Validate(validate::ValidateArgs),

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = match OrchestratorConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail(CliError::from(e)),
    };

    init_tracing(&config.logging, cli.verbose, cli.log_json);

    match run(cli, config).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => fail(e),
    }
}

async fn run(cli: Cli, config: OrchestratorConfig) -> CliResult<i32> {
    let color = !cli.no_color;

    match cli.command {
        Commands::Deploy(args) => deploy::execute(args, config, cli.output, color).await,
        Commands::Verify(args) => verify::execute(args, config, cli.output, color).await,
        Commands::Validate(args) => validate::execute(args, &config, cli.output),
        Commands::Config => {
            output::print_single(&config, cli.output)?;
            Ok(0)
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json || logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn fail(error: CliError) -> ExitCode {
    print_error(&error.to_string());
    ExitCode::from(error.exit_code())
}
