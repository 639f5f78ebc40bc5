use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock deadline in seconds, after which the container is stopped
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Memory ceiling in mebibytes (swap is pinned to the same value)
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes/threads inside the container
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// CPU quota in cores (e.g. 0.5 for half a core)
    #[serde(default)]
    pub cpus: Option<f64>,
}

impl ResourceLimits {
    /// 1 mebibyte in bytes
    pub const MIB: u64 = 1024 * 1024;

    /// Create new resource limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource limits with every field unset, for use as an override set
    pub fn none() -> Self {
        Self {
            wall_time_limit: None,
            memory_limit: None,
            max_processes: None,
            cpus: None,
        }
    }

    /// Set the wall clock deadline in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the memory ceiling in mebibytes
    pub fn with_memory_limit(mut self, mib: u64) -> Self {
        self.memory_limit = Some(mib);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the CPU quota in cores
    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            cpus: overrides.cpus.or(self.cpus),
        }
    }

    /// Memory ceiling in bytes, as the container runtime expects it
    pub fn memory_bytes(&self) -> Option<i64> {
        self.memory_limit
            .and_then(|mib| mib.checked_mul(Self::MIB))
            .and_then(|bytes| i64::try_from(bytes).ok())
    }

    /// CPU quota in billionths of a core
    pub fn nano_cpus(&self) -> Option<i64> {
        self.cpus.map(|cpus| (cpus * 1_000_000_000.0) as i64)
    }

    /// Check every set limit is usable by a sandbox
    ///
    /// The wall clock limit must be a finite, positive number of seconds that
    /// fits a [`Duration`]; memory and CPU limits must be positive.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(seconds) = self.wall_time_limit
            && !(seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok())
        {
            return Err(format!(
                "wall_time_limit must be a positive number of seconds, got {seconds}"
            ));
        }
        if self.memory_limit == Some(0) {
            return Err("memory_limit must be positive".to_owned());
        }
        if let Some(cpus) = self.cpus
            && !(cpus.is_finite() && cpus > 0.0)
        {
            return Err(format!("cpus must be a positive number, got {cpus}"));
        }
        Ok(())
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(8.0),
            memory_limit: Some(256),
            max_processes: Some(128),
            cpus: Some(1.0),
        }
    }
}

/// A single request to run source code
///
/// Lives only for the duration of one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language id or alias (e.g. "python", "py")
    pub language: String,

    /// Source text, written verbatim as the entry file
    pub source: String,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
        }
    }
}

/// Result of an execution
///
/// Sandbox-layer failures are reported through `stderr` with empty `stdout`,
/// so a caller always receives one of these once validation has passed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output, decoded lossily as UTF-8
    pub stdout: String,

    /// Captured standard error, decoded lossily as UTF-8
    pub stderr: String,

    /// Exit code of the entry process, if it was observed
    #[serde(default)]
    pub exit_code: Option<i64>,

    /// Whether the wall clock deadline fired and the container was stopped
    #[serde(default)]
    pub timed_out: bool,

    /// Wall clock time from start to termination in seconds
    #[serde(default)]
    pub wall_time: f64,
}

impl ExecutionResult {
    /// A result carrying only a failure description on stderr
    pub fn from_failure(message: impl Into<String>) -> Self {
        Self {
            stderr: message.into(),
            ..Default::default()
        }
    }

    /// Check if the program ran to completion and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}
