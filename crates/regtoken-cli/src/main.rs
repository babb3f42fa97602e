//! # regtoken CLI Entry Point
//!
//! Reads the environment configuration, installs the tracing subscriber
//! and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use regtoken_cli::config::{CliConfig, LogFormat};
use regtoken_cli::run::{run_scenario, RunArgs};
use regtoken_cli::validate::{run_validate, ValidateArgs};

/// Compliance-gated token ledger tooling.
#[derive(Parser, Debug)]
#[command(name = "regtoken", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    /// Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a scenario file without running it.
    Validate(ValidateArgs),

    /// Replay a scenario against a fresh ledger.
    Run(RunArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }

    tracing::debug!(?config, "regtoken starting");

    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args),
        Commands::Run(args) => run_scenario(&args, &config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
