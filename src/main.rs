//! abex - AI-assisted literature abstract extraction
//!
//! CLI entry point.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;

use abex::cli::{self, Cli, Commands};
use abex::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{}: {e}", e.category());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> abex::Result<()> {
    let config = cli.load_config()?;
    match &cli.command {
        Commands::Extract(args) => cli::run_extract(&config, args).await,
        Commands::Keys(args) => cli::run_keys(&config, args),
    }
}
