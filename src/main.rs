//! chatops - Telegram-first operations console.
//!
//! Slash commands from a chat are routed to Jenkins, Docker, Kubernetes, Prometheus and an AI model.

use clap::Parser;
use std::process::ExitCode;

use chatops::{cli::Cli, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    // The service logs to a file as well; one-shot commands only need stderr.
    let _guard = if args.is_serve() {
        match logging::init() {
            Ok((guard, _dir)) => Some(guard),
            Err(e) => {
                logging::init_console();
                tracing::warn!("File logging unavailable, using console only: {}", e);
                None
            }
        }
    } else {
        logging::init_console();
        None
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
