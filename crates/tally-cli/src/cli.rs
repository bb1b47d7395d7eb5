//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Timer work period sync.
///
/// Reduces the timer's transition log to whole-minute work periods and
/// delivers them to Notion, queueing failed deliveries for the next run.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deliver completed work periods and clear the transition log.
    Sync,

    /// Show the periods a sync would deliver, without delivering them.
    Preview {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show pending transitions, queued retries and timer state.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tally", "preview", "--json", "-v", "-c", "/tmp/tally.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tally.toml")));
        assert!(matches!(cli.command, Some(Commands::Preview { json: true })));
    }
}
