#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;
mod shutdown;

use std::process;

use crate::config::{Cli, Command};

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "nodeflow_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "nodeflow_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "nodeflow_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "nodeflow_cli::command";

#[tokio::main]
async fn main() {
    let error = match run().await {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(error) => error,
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
///
/// Returns whether the command succeeded: a valid workflow for `validate`,
/// a `success` status for `run`.
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();

    match &cli.command {
        Command::Validate { path, pretty } => command::validate(path, *pretty).await,
        Command::Run(args) => command::run(args, &cli.engine, &cli.http).await,
    }
}
