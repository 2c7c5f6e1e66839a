//! engulf CLI entry point.

use clap::Parser;
use std::process::ExitCode;

use engulf::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match cli::commands::run::execute(cli).await {
        Ok(true) => ExitCode::from(cli::EXIT_SUCCESS),
        Ok(false) => ExitCode::from(cli::EXIT_FAILURES),
        Err(err) => cli::handle_error(err, json),
    }
}
