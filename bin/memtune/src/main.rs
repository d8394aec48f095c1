//! Memory sizing analysis for serverless functions.
//!
//! Reads invocation reports for a function, aggregates duration and memory usage per configured memory size, and
//! suggests memory sizes based on the observed durations.

#![deny(warnings)]
#![deny(missing_docs)]

use clap::Parser as _;
use memtune_app::prelude::*;
use tracing::error;

mod cli;
use self::cli::{handle_analyze_command, load_configuration, Action, Cli};

mod source;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let configuration = load_configuration(cli.config_file.as_deref())
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to load configuration: {:#}", e)));
    let logging_config = LoggingConfiguration::from_configuration(&configuration)
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to load logging configuration: {:#}", e)));
    let logging_guard = initialize_logging(&logging_config)
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to initialize logging: {:#}", e)));

    let result = match cli.action {
        Action::Analyze(command) => handle_analyze_command(command, &configuration).await,
    };

    if let Err(e) = result {
        error!("{:?}", e);
        drop(logging_guard);
        std::process::exit(1);
    }
}
