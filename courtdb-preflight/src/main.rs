//! courtdb-preflight - Main entry point
//!
//! Validates a courtdb warehouse before or after a load and exits with
//! 0 (clean), 1 (fatal findings) or 2 (infrastructure error).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courtdb_common::config::{CliOverrides, Settings, ENV_CONFIG, ENV_DATABASE, ENV_EXPECTATIONS};
use courtdb_common::Severity;
use courtdb_engine::ValidationPlan;
use courtdb_preflight::{execute, Mode, EXIT_INFRASTRUCTURE};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for courtdb-preflight
#[derive(Parser, Debug)]
#[command(name = "courtdb-preflight")]
#[command(about = "Schema-drift and integrity checks for the courtdb warehouse")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = ENV_CONFIG)]
    config: Option<PathBuf>,

    /// SQLite warehouse file
    #[arg(short, long, env = ENV_DATABASE)]
    database: Option<PathBuf>,

    /// Expectations document
    #[arg(short, long, env = ENV_EXPECTATIONS)]
    expectations: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Lowest severity that fails the run (info, warn, error)
    #[arg(long)]
    fatal_threshold: Option<Severity>,

    /// Open the warehouse read-only and skip the run ledger
    #[arg(long)]
    no_ledger: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Drift checks and warehouse validation (default)
    Preflight,
    /// Also resolve the staged box score and draft extracts
    Resolve,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            database_path: self.database.clone(),
            expectations_path: self.expectations.clone(),
            log_level: self.log_level.clone(),
            fatal_threshold: self.fatal_threshold,
            record_ledger: self.no_ledger.then_some(false),
        }
    }

    fn mode(&self) -> Mode {
        match self.command {
            Some(Command::Resolve) => Mode::Resolve,
            Some(Command::Preflight) | None => Mode::Preflight,
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    Settings::resolve(&args.overrides()).context("Failed to resolve settings")
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing("info");
            error!("{:#}", e);
            return ExitCode::from(EXIT_INFRASTRUCTURE);
        }
    };

    init_tracing(&settings.log_level);

    info!(
        "Starting courtdb-preflight v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "Warehouse: {}, expectations: {}, fatal threshold: {}",
        settings.database_path.display(),
        settings.expectations_path.display(),
        settings.fatal_threshold
    );

    let code = execute(&settings, ValidationPlan::warehouse_default(), args.mode()).await;
    ExitCode::from(code)
}
