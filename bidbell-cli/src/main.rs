mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod output;

use anyhow::Context;
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::error;

use crate::cli::{Args, Commands, OutputFormat};
use crate::commands::CommandExecutor;
use crate::config::AppConfig;
use crate::output::Printer;

#[tokio::main]
async fn main() -> ExitCode {
    // Before parsing, so `.env` values reach clap's `env` fallbacks.
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let printer = Printer::new(args.output, std::io::stdout().is_terminal());

    match run(args, printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let message = format!("{e:#}");
            match printer.format() {
                OutputFormat::Json => println!("{}", printer.error(&message)),
                OutputFormat::Pretty => eprintln!("{}", printer.error(&message)),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, printer: Printer) -> anyhow::Result<()> {
    let mut config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    config.apply_args(&args);

    let _log_guard = logging::init_logging(args.verbose, args.quiet, config.log_dir.as_deref())?;

    let executor = CommandExecutor::new(config, printer);
    match args.command {
        Commands::Watch { limit, no_resync } => executor.watch(limit, no_resync).await?,
        Commands::List { limit } => executor.list(limit).await?,
        Commands::Read { id } => executor.read(&id).await?,
        Commands::ReadAll => executor.read_all().await?,
        Commands::Delete { id } => executor.delete(&id).await?,
        Commands::Config => executor.show_config()?,
    }
    Ok(())
}
