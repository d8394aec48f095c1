use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use memtune_config::{ConfigurationLoader, GenericConfiguration};
use memtune_error::{ErrorContext as _, GenericError};

mod analyze;
pub use self::analyze::handle_analyze_command;
use self::analyze::AnalyzeCommand;

const DEFAULT_CONFIG_PATH: &str = "memtune.yaml";
const ENV_PREFIX: &str = "memtune";

#[derive(Parser)]
#[command(name = "memtune", about = "Memory sizing analysis for serverless functions", version)]
pub struct Cli {
    /// Path to the configuration file.
    ///
    /// Defaults to `memtune.yaml` in the current directory, which is skipped if it doesn't exist.
    #[arg(short = 'c', long = "config", global = true)]
    pub config_file: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand)]
pub enum Action {
    /// Analyzes invocation reports for a function and suggests memory sizes.
    Analyze(AnalyzeCommand),
}

/// Loads the configuration, layering environment variables prefixed with `MEMTUNE_` over the configuration file.
///
/// An explicitly given configuration file must exist, while the default one is optional.
pub fn load_configuration(config_file: Option<&Path>) -> Result<GenericConfiguration, GenericError> {
    let loader = match config_file {
        Some(path) => ConfigurationLoader::default()
            .from_yaml(path)
            .with_error_context(|| format!("Failed to load configuration file '{}'.", path.display()))?,
        None => ConfigurationLoader::default().try_from_yaml(DEFAULT_CONFIG_PATH),
    };

    let loader = loader
        .from_environment(ENV_PREFIX)
        .error_context("Failed to load configuration from environment.")?;

    Ok(loader.into_generic())
}
