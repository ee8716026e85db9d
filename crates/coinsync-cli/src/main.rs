mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use std::process::ExitCode;

use coinsync_core::logging::init_logging;
use coinsync_core::AppConfig;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_dir.as_deref());

    let mut config = AppConfig::from_env()?;
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }

    let Some(value) = commands::run(&cli, config).await? else {
        return Ok(ExitCode::SUCCESS);
    };
    output::render(&value, cli.pretty)?;

    if let Some(message) = output::error_message(&value) {
        return Err(CliError::ToolFailed(message.to_owned()));
    }
    Ok(ExitCode::SUCCESS)
}
