//! Logging.

use memtune_error::{generic_error, GenericError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

mod config;
pub use self::config::LoggingConfiguration;

mod layer;
use self::layer::build_formatting_layer;

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// Events are filtered by the configured log level and written to standard error, either in a human-readable format or
/// as JSON. Standard output is left untouched so that it can carry the report.
///
/// Returns a [`WorkerGuard`] which must be held until the application is about to exit, ensuring that any buffered log
/// events are flushed.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<WorkerGuard, GenericError> {
    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(build_formatting_layer(config, nb_stderr).with_filter(config.env_filter()))
        .try_init()
        .map_err(|e| generic_error!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}
