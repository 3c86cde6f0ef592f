//! sessionrelay - command-line access to a bearer-token protected backend.
//!
//! Signs in, keeps the session on disk between runs and calls protected
//! endpoints, renewing the access token transparently when it expires.

mod commands;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionrelay_core::{ApiClient, Config};

use commands::Command;

/// Directory for log files; logs go to stderr when unset
const ENV_LOG_DIR: &str = "SESSIONRELAY_LOG_DIR";

/// Exit code used when the session ended and the user must sign in again
const EXIT_SESSION_ENDED: u8 = 2;

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), "sessionrelay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, commands::USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    if matches!(command, Command::Help) {
        println!("{}", commands::USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load().context("Failed to load config")?;
    debug!(base_url = %config.base_url, "Config loaded");

    let store = Arc::new(config.open_store().context("Failed to open session store")?);
    let client = ApiClient::new(&config, store).context("Failed to create API client")?;
    info!(state = ?client.state(), "sessionrelay starting");

    let outcome = commands::execute(command, &client, &mut config).await?;
    Ok(match outcome {
        commands::Outcome::Done => ExitCode::SUCCESS,
        commands::Outcome::SessionEnded => ExitCode::from(EXIT_SESSION_ENDED),
    })
}
