//! Duesbot - membership dues and task tracking bot for Telegram.

use clap::Parser;
use std::process::ExitCode;

use duesbot::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Held until exit so buffered file logs are flushed.
    let _guard = match logging::init() {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
