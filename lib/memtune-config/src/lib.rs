//! Layered configuration.
//!
//! Configuration is merged from a YAML file and from prefixed environment variables, with the environment taking
//! precedence. Values are queried by dotted key (`fetch.max_iterations`), and a key can always be overridden from the
//! environment by its flattened, uppercased form (`MEMTUNE_FETCH_MAX_ITERATIONS`).
#![deny(warnings)]
#![deny(missing_docs)]

use std::{path::Path, sync::Arc};

use figment::{
    error::Kind,
    providers::{Env, Yaml},
    Figment,
};
use memtune_error::GenericError;
use serde::Deserialize;
use snafu::Snafu;
use tracing::debug;

mod provider;
use self::provider::FileSnapshot;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// A configuration source could not be loaded.
    #[snafu(display("Failed to load configuration from {}.", origin))]
    Load {
        /// Where the configuration was being loaded from.
        origin: String,

        /// Error source.
        source: GenericError,
    },

    /// Requested key was not present in any source.
    #[snafu(display("Missing configuration key '{}'. {}", key, help_text))]
    MissingField {
        /// The missing key.
        key: String,

        /// Describes how the key can be set.
        help_text: String,
    },

    /// Requested key held a value of the wrong type.
    #[snafu(display("Expected configuration key '{}' to be {}, got {} instead.", key, expected_ty, actual_ty))]
    InvalidFieldType {
        /// The key whose value had the wrong type.
        key: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Requested key could not be deserialized for any other reason.
    #[snafu(display("Failed to read configuration key '{}'.", key))]
    Query {
        /// The key being read.
        key: String,

        /// Error source.
        source: GenericError,
    },
}

/// Builds a [`GenericConfiguration`] from layered sources.
///
/// Sources added later take precedence over sources added earlier.
#[derive(Default)]
pub struct ConfigurationLoader {
    figment: Figment,
    env_prefix: Option<String>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let snapshot = FileSnapshot::read::<Yaml>(path).map_err(|e| ConfigurationError::Load {
            origin: format!("'{}'", path.display()),
            source: e.into(),
        })?;

        self.figment = self.figment.admerge(snapshot);
        Ok(self)
    }

    /// Loads the given YAML configuration file if it can be read, and skips it otherwise.
    pub fn try_from_yaml<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        match FileSnapshot::read::<Yaml>(path) {
            Ok(snapshot) => Self {
                figment: self.figment.admerge(snapshot),
                env_prefix: self.env_prefix,
            },
            Err(e) => {
                debug!(error = %e, file_path = %path.display(), "Skipping unreadable configuration file.");
                self
            }
        }
    }

    /// Loads configuration from environment variables starting with `prefix`, followed by an underscore.
    ///
    /// The prefix is case-insensitive, and is stripped from the resulting keys. For example, with a prefix of
    /// `memtune`, `MEMTUNE_LOG_LEVEL` sets `log_level`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        let prefix = prefix.trim_end_matches('_');
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = format!("{}_", prefix.to_uppercase());
        self.figment = self.figment.admerge(Env::prefixed(&prefix));
        self.env_prefix = Some(prefix);
        Ok(self)
    }

    /// Consumes the loader, returning the merged configuration.
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            figment: Arc::new(self.figment),
            env_prefix: self.env_prefix.map(Arc::from),
        }
    }
}

/// Merged configuration, queried by key.
///
/// Keys are in the form `a.b.c`, where each period indicates a nested value. Given the YAML configuration:
///
/// ```yaml
/// fetch:
///   max_iterations: 50
/// ```
///
/// querying `fetch.max_iterations` returns `50`. When environment variables were loaded, the flattened form of the key
/// (`fetch_max_iterations`, as set by `<PREFIX>_FETCH_MAX_ITERATIONS`) is checked first.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    figment: Arc<Figment>,
    env_prefix: Option<Arc<str>>,
}

impl GenericConfiguration {
    /// Gets a configuration value by key.
    ///
    /// # Errors
    ///
    /// If the key does not exist in the configuration, or if the value could not be deserialized into `T`, an error
    /// will be returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        if self.env_prefix.is_some() && key.contains('.') {
            let flattened_key = key.replace('.', "_");
            match self.figment.extract_inner(&flattened_key) {
                Ok(value) => return Ok(value),
                Err(e) if !matches!(e.kind, Kind::MissingField(_)) => return Err(self.query_error(key, e)),
                Err(_) => {}
            }
        }

        self.figment.extract_inner(key).map_err(|e| self.query_error(key, e))
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// # Errors
    ///
    /// If the key exists, but the value could not be deserialized into `T`, an error will be returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.get_typed(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn query_error(&self, key: &str, e: figment::Error) -> ConfigurationError {
        match e.kind {
            Kind::MissingField(_) => {
                let help_text = match &self.env_prefix {
                    Some(prefix) => format!(
                        "Try setting `{}` or `{}{}`.",
                        key,
                        prefix,
                        key.replace('.', "_").to_uppercase()
                    ),
                    None => format!("Try setting `{}`.", key),
                };
                ConfigurationError::MissingField {
                    key: key.to_string(),
                    help_text,
                }
            }
            Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
                key: key.to_string(),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => ConfigurationError::Query {
                key: key.to_string(),
                source: e.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn nested_yaml_lookup() {
        let file = yaml_file("fetch:\n  max_iterations: 50\n  filter_pattern: REPORT\n");
        let config = ConfigurationLoader::default().from_yaml(file.path()).unwrap().into_generic();

        assert_eq!(config.get_typed::<u32>("fetch.max_iterations").unwrap(), 50);
        assert_eq!(config.get_typed::<String>("fetch.filter_pattern").unwrap(), "REPORT");
        assert_eq!(config.try_get_typed::<u32>("fetch.timeout_secs").unwrap(), None);
    }

    #[test]
    fn invalid_type_is_reported() {
        let file = yaml_file("fetch:\n  max_iterations: lots\n");
        let config = ConfigurationLoader::default().from_yaml(file.path()).unwrap().into_generic();

        match config.try_get_typed::<u32>("fetch.max_iterations") {
            Err(ConfigurationError::InvalidFieldType { key, .. }) => assert_eq!(key, "fetch.max_iterations"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn later_files_take_precedence() {
        let base = yaml_file("fetch:\n  max_iterations: 50\n  timeout_secs: 10\n");
        let overrides = yaml_file("fetch:\n  max_iterations: 20\n");
        let config = ConfigurationLoader::default()
            .from_yaml(base.path())
            .and_then(|loader| loader.from_yaml(overrides.path()))
            .unwrap()
            .into_generic();

        assert_eq!(config.get_typed::<u32>("fetch.max_iterations").unwrap(), 20);
        assert_eq!(config.get_typed::<u32>("fetch.timeout_secs").unwrap(), 10);
    }

    #[test]
    fn missing_yaml_file_is_skipped_by_try_variant() {
        let config = ConfigurationLoader::default()
            .try_from_yaml("/nonexistent/memtune.yaml")
            .into_generic();
        assert_eq!(config.try_get_typed::<u32>("fetch.max_iterations").unwrap(), None);
    }

    #[test]
    fn missing_yaml_file_is_an_error() {
        match ConfigurationLoader::default().from_yaml("/nonexistent/memtune.yaml") {
            Err(ConfigurationError::Load { origin, .. }) => assert_eq!(origin, "'/nonexistent/memtune.yaml'"),
            Err(e) => panic!("unexpected error: {:?}", e),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let file = yaml_file("fetch: [unterminated\n");
        assert!(ConfigurationLoader::default().from_yaml(file.path()).is_err());
    }

    #[test]
    fn empty_prefix_rejected() {
        for prefix in ["", "_"] {
            assert!(matches!(
                ConfigurationLoader::default().from_environment(prefix),
                Err(ConfigurationError::EmptyPrefix)
            ));
        }
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("memtune.yaml", "fetch:\n  max_iterations: 50\n  timeout_secs: 10\n")?;
            jail.set_env("MTTEST_FETCH_MAX_ITERATIONS", "7");

            let config = ConfigurationLoader::default()
                .from_yaml("memtune.yaml")
                .and_then(|loader| loader.from_environment("mttest"))
                .map_err(|e| e.to_string())?
                .into_generic();

            assert_eq!(config.get_typed::<u32>("fetch.max_iterations").unwrap(), 7);
            assert_eq!(config.get_typed::<u32>("fetch.timeout_secs").unwrap(), 10);
            Ok(())
        });
    }

    #[test]
    fn missing_field_help_mentions_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MTTEST_UNRELATED", "1");

            let config = ConfigurationLoader::default()
                .from_environment("mttest_")
                .map_err(|e| e.to_string())?
                .into_generic();

            match config.get_typed::<u32>("fetch.max_iterations") {
                Err(ConfigurationError::MissingField { help_text, .. }) => {
                    assert_eq!(
                        help_text,
                        "Try setting `fetch.max_iterations` or `MTTEST_FETCH_MAX_ITERATIONS`."
                    );
                }
                other => panic!("unexpected result: {:?}", other),
            }
            Ok(())
        });
    }
}
