//! Configuration file loading for Codecell
//!
//! Handles loading and parsing configuration files using the config crate.

use std::collections::HashSet;
use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG};

/// Prefix for environment variable overrides (e.g. `CODECELL_DOCKER_HOST`)
pub const ENV_PREFIX: &str = "CODECELL";

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the layered process configuration
    ///
    /// Embedded defaults, then the optional file, then `CODECELL_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.container_workdir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "container_workdir '{}' must be absolute",
                self.container_workdir
            )));
        }

        self.default_limits
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("default limits: {e}")))?;

        let mut seen: HashSet<&str> = self.languages.keys().map(String::as_str).collect();

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if lang.source_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty source name"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = lang.compile
                && (compile.command.is_empty() || compile.output_name.is_empty())
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command or output name"
                )));
            }
            if let Some(entry) = lang.run.env.iter().find(|entry| !entry.contains('=')) {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has malformed env entry '{entry}'"
                )));
            }
            if let Some(ref limits) = lang.limits {
                limits.validate().map_err(|e| {
                    ConfigError::Invalid(format!("language '{id}' limits: {e}"))
                })?;
            }
            for alias in &lang.aliases {
                if !seen.insert(alias.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "alias '{alias}' of language '{id}' is already taken"
                    )));
                }
            }
        }

        Ok(())
    }
}
