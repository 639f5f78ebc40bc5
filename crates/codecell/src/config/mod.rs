use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{CompileConfig, EntryFile, Language, RunConfig};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codecell.example.toml");

/// Network mode every sandbox is created with. Not configurable.
pub const NETWORK_MODE: &str = "none";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid entry file name '{0}'")]
    InvalidEntryFile(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Codecell
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Container runtime endpoint (uses local defaults if not specified).
    ///
    /// Accepts a unix socket path, a `unix://` URL, or a `tcp://`/`http://` URL.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Host directory under which per-request workspaces are created.
    ///
    /// Must be visible to the container runtime for bind mounts.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory inside the container where the workspace is mounted
    #[serde(default = "default_container_workdir")]
    pub container_workdir: String,

    /// Pull a language image before provisioning if the host lacks it
    #[serde(default)]
    pub pull_missing_images: bool,

    /// Default resource limits applied to all executions.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: BTreeMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_host: None,
            staging_dir: default_staging_dir(),
            container_workdir: default_container_workdir(),
            pull_missing_images: false,
            default_limits: ResourceLimits::default(),
            languages: BTreeMap::new(),
        }
    }

    /// Get a language by ID or alias
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.resolve_id(id)
            .and_then(|id| self.languages.get(id))
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Resolve an alias to its canonical language ID
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.languages.contains_key(id) {
            return Some(id);
        }
        self.languages
            .iter()
            .find(|(_, lang)| lang.aliases.iter().any(|alias| alias == id))
            .map(|(canonical, _)| canonical.as_str())
    }

    /// Merge resource limits: defaults, then the language's, then overrides
    pub fn effective_limits(
        &self,
        language: &Language,
        overrides: Option<&ResourceLimits>,
    ) -> ResourceLimits {
        let mut limits = self.default_limits.clone();
        if let Some(ref lang_limits) = language.limits {
            limits = limits.with_overrides(lang_limits);
        }
        if let Some(user_limits) = overrides {
            limits = limits.with_overrides(user_limits);
        }
        limits
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("codecell")
}

fn default_container_workdir() -> String {
    "/usr/src/app".to_owned()
}
