//! phosh-itest -- run a nested phosh session and check its logs.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use colored::Colorize;

use phosh_itest_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let writer = OutputWriter::new(cli.output);

    if let Err(e) = run(cli, &writer).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(args) => {
            let mut general = GeneralConfig::default();
            if let Some(level) = cli.log_level {
                general.log_level = level;
            }
            init_logging(&general)?;
            commands::config::execute(args, &cli.config, writer).await
        }
        Commands::Run(args) => {
            let mut config = commands::config::load_effective(&cli.config).await?;
            if let Some(level) = cli.log_level {
                config.general.log_level = level;
            }
            init_logging(&config.general)?;

            tracing::info!(config = %cli.config.display(), "phosh-itest starting");
            commands::run::execute(args, config, writer).await
        }
    }
}

fn init_logging(general: &GeneralConfig) -> Result<(), CliError> {
    logging::init_tracing(general)
        .map_err(|e| CliError::Command(format!("failed to initialize logging: {e}")))
}
