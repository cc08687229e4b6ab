//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── command: Command    # validate | run
//! ├── engine: EngineArgs  # concurrency, timeouts, loop bound
//! └── http: ReqwestConfig # outbound HTTP client
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.

mod engine;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
pub use engine::EngineArgs;
use nodeflow_http::ReqwestConfig;
use nodeflow_runtime::definition::TriggerType;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "nodeflow")]
#[command(about = "Validate and run nodeflow workflows")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Execution engine limits.
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// Outbound HTTP client used by `api_call` nodes.
    #[clap(flatten)]
    pub http: ReqwestConfig,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validates a workflow definition and prints the issues found
    Validate {
        /// Path to the workflow JSON file
        path: PathBuf,

        /// Pretty-print the validation result
        #[arg(long)]
        pretty: bool,
    },

    /// Runs a workflow once and prints the execution result
    Run(RunArgs),
}

/// Arguments of the `run` subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Path to the workflow JSON file
    pub path: PathBuf,

    /// Path to a trigger event JSON file
    #[arg(long)]
    pub trigger: Option<PathBuf>,

    /// Overrides the trigger type of the event
    #[arg(long)]
    pub trigger_type: Option<TriggerType>,

    /// Restricts the event to the declared trigger with this id
    #[arg(long)]
    pub trigger_id: Option<String>,

    /// Pretty-print the execution result
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so that its
    /// values act as defaults for `env` fallbacks.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    ///
    /// Logs go to stderr so that stdout only carries the printed result.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        self.engine.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            http_timeout_secs = self.http.effective_timeout().as_secs(),
            user_agent = %self.http.effective_user_agent(),
            "HTTP client configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
