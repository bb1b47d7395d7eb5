use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally_cli::commands::sync::SyncError;
use tally_cli::commands::{preview, status, sync};
use tally_cli::{Cli, Commands, Config};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so stdout stays parseable for `preview --json`
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();

    match &cli.command {
        Some(Commands::Sync) => match sync::run(&config) {
            Ok(outcome) => {
                sync::render(&mut stdout, &outcome)?;
                Ok(sync::exit_code(&outcome))
            }
            Err(SyncError::Config(err)) => {
                eprintln!("error: {err}");
                Ok(ExitCode::FAILURE)
            }
            Err(SyncError::Run(err)) => Err(err),
        },
        Some(Commands::Preview { json }) => {
            preview::run(&mut stdout, &config, *json)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Status) => {
            status::run(&mut stdout, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(ExitCode::SUCCESS)
        }
    }
}
