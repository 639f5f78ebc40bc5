use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

/// Shell used to chain the compile and run steps of compiled languages
pub const COMPOSE_SHELL: &str = "/bin/sh";

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ (GCC)")
    pub name: String,

    /// Toolchain version advertised to clients
    #[serde(default)]
    pub version: String,

    /// Alternative ids that resolve to this language (e.g., "py")
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Container image the program runs in
    pub image: String,

    /// Name of the entry file written into the workspace
    pub source_name: EntryFile,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,

    /// Resource limits for this language (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Name of the artifact the run step refers to as `{binary}`
    pub fn binary_name(&self) -> &str {
        match self.compile {
            Some(ref compile) => &compile.output_name,
            None => self.source_name.as_str(),
        }
    }

    /// The entry process of the container
    ///
    /// Interpreted languages run their expanded run command directly. Compiled
    /// languages chain `compile && run` through the shell so that a failed
    /// compilation never runs and its diagnostics land on stderr.
    pub fn command(&self) -> Vec<String> {
        let source = self.source_name.as_str();
        let binary = self.binary_name();
        let run = Self::expand_command(&self.run.command, source, binary);

        match self.compile {
            Some(ref compile) => {
                let build = Self::expand_command(&compile.command, source, binary);
                vec![
                    COMPOSE_SHELL.to_owned(),
                    "-c".to_owned(),
                    format!("{} && {}", shell_join(&build), shell_join(&run)),
                ]
            }
            None => run,
        }
    }

    /// Environment for the container in `KEY=VALUE` form
    pub fn env(&self) -> &[String] {
        &self.run.env
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// Quote a single argument for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if safe {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Join arguments into a single shell command line
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Entry file name without any directory component (e.g., "Main.java")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFile(String);

impl EntryFile {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ConfigError::InvalidEntryFile(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for EntryFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntryFile::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file name without '/', '\\' or '..'",
            )
        })
    }
}

impl std::fmt::Display for EntryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    pub command: Vec<String>,

    /// Output artifact name (e.g., "main")
    pub output_name: String,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}
    pub command: Vec<String>,

    /// Environment variables to set, as `KEY=VALUE`
    #[serde(default)]
    pub env: Vec<String>,
}
