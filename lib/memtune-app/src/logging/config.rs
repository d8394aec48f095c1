use std::fmt;

use memtune_config::GenericConfiguration;
use memtune_error::{generic_error, ErrorContext as _, GenericError};
use serde::{
    de::{Error, Unexpected},
    Deserialize, Deserializer,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Logging configuration.
///
/// Read from the `log_level` and `log_format_json` keys, which map to `MEMTUNE_LOG_LEVEL` and
/// `MEMTUNE_LOG_FORMAT_JSON` when loaded from the environment.
pub struct LoggingConfiguration {
    log_level: LogLevel,
    log_format_json: bool,
}

impl LoggingConfiguration {
    /// Creates a new `LoggingConfiguration` instance from the given configuration.
    ///
    /// The log level defaults to `INFO`, and the output format defaults to the human-readable format.
    ///
    /// # Errors
    ///
    /// If the log level is not a valid filter directive, or the JSON flag is not a boolean-like value, an error is
    /// returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        let log_level = match config.try_get_typed::<String>("log_level")? {
            Some(raw) => LogLevel::try_from(raw)?,
            None => LevelFilter::INFO.into(),
        };
        let log_format_json = config
            .try_get_typed::<PermissiveBool>("log_format_json")?
            .map(|b| b.0)
            .unwrap_or(false);

        Ok(Self {
            log_level,
            log_format_json,
        })
    }

    /// Sets whether events are formatted as JSON.
    pub fn with_log_format_json(mut self, log_format_json: bool) -> Self {
        self.log_format_json = log_format_json;
        self
    }

    /// Returns the level filter to apply to all events.
    pub fn env_filter(&self) -> EnvFilter {
        self.log_level.as_env_filter()
    }

    /// Returns `true` if events should be formatted as JSON.
    pub fn log_format_json(&self) -> bool {
        self.log_format_json
    }
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::INFO.into(),
            log_format_json: false,
        }
    }
}

struct LogLevel(EnvFilter);

impl LogLevel {
    fn as_env_filter(&self) -> EnvFilter {
        // `EnvFilter` isn't `Clone`, so rebuild it from its rendered directives.
        EnvFilter::builder()
            .parse(self.0.to_string())
            .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        Self(EnvFilter::default().add_directive(level.into()))
    }
}

impl TryFrom<String> for LogLevel {
    type Error = GenericError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(generic_error!("Log level cannot be empty."));
        }

        EnvFilter::builder()
            .parse(value)
            .map(Self)
            .error_context("Failed to parse valid log level.")
    }
}

/// Permissively deserialized boolean.
///
/// Accepts `true`/`false` as a native boolean or as a case-insensitive string, and `1`/`0` as an integer.
struct PermissiveBool(bool);

impl<'de> Deserialize<'de> for PermissiveBool {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = bool;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean, string, or integer")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(value)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                match value.trim().to_lowercase().as_str() {
                    "true" | "1" => Ok(true),
                    "false" | "0" => Ok(false),
                    _ => Err(Error::invalid_value(
                        Unexpected::Str(value),
                        &"\"true\" or \"false\" (case insensitive)",
                    )),
                }
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                match value {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(Error::invalid_value(Unexpected::Signed(value), &"0 or 1")),
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                match value {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(Error::invalid_value(Unexpected::Unsigned(value), &"0 or 1")),
                }
            }
        }

        deserializer.deserialize_any(Visitor).map(PermissiveBool)
    }
}

#[cfg(test)]
mod tests {
    use memtune_config::ConfigurationLoader;

    use super::*;

    #[test]
    fn defaults_without_configuration() {
        let config = ConfigurationLoader::default().into_generic();
        let logging = LoggingConfiguration::from_configuration(&config).unwrap();

        assert!(!logging.log_format_json());
        assert_eq!(logging.env_filter().to_string(), "info");
    }

    #[test]
    fn empty_log_level_rejected() {
        assert!(LogLevel::try_from("  ".to_string()).is_err());
    }

    #[test]
    fn log_level_directive_parsed() {
        let level = LogLevel::try_from("debug".to_string()).unwrap();
        assert_eq!(level.as_env_filter().to_string(), "debug");
    }
}
