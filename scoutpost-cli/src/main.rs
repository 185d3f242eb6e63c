//! Scoutpost CLI -- per-user Nightscout instance administration.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use colored::Colorize;

use scoutpost_core::config::{GeneralConfig, ScoutpostConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            if e.is_retryable() {
                eprintln!("{} the operation can be retried", "hint:".yellow());
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // config subcommands report load errors themselves
    let loaded = ScoutpostConfig::load(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = cli.log_level {
        general.log_level = level;
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;

    scoutpost_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "scoutpost starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Instance(args) => {
            let config = loaded?;
            commands::instance::execute(args, &config, &writer).await
        }
        Commands::Reconcile(args) => {
            let config = loaded?;
            commands::reconcile::execute(args, &config, &writer).await
        }
    }
}
