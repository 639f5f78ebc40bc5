//! Provisioning spec for a sandbox
//!
//! Builder collecting everything the container runtime needs to create one
//! sandbox: image, entry process, workspace mount, limits and labels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::NETWORK_MODE;
use crate::sandbox::{MANAGED_LABEL, REQUEST_LABEL};
use crate::types::ResourceLimits;

/// A host directory bind-mounted read-write into the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Source path on the host
    pub source: PathBuf,
    /// Target path in the sandbox
    pub target: String,
}

impl BindMount {
    /// Render in the runtime's `source:target` bind syntax
    pub fn to_bind_string(&self) -> String {
        format!("{}:{}", self.source.display(), self.target)
    }
}

/// Builder for sandbox provisioning parameters
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    name: String,
    image: String,
    command: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
    bind: Option<BindMount>,
    limits: ResourceLimits,
    labels: HashMap<String, String>,
}

impl SandboxSpec {
    /// Create a new spec for the given image
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_owned(), "true".to_owned());

        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            bind: None,
            limits: ResourceLimits::default(),
            labels,
        }
    }

    /// Set the entry process
    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Add environment variables in `KEY=VALUE` form
    pub fn env(mut self, vars: impl IntoIterator<Item = String>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Bind-mount a host directory and use the target as working directory
    pub fn workspace(mut self, source: impl AsRef<Path>, target: impl Into<String>) -> Self {
        let target = target.into();
        self.working_dir = Some(target.clone());
        self.bind = Some(BindMount {
            source: source.as_ref().to_path_buf(),
            target,
        });
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Tag the sandbox with the request it serves
    pub fn request_id(self, id: impl Into<String>) -> Self {
        self.label(REQUEST_LABEL, id)
    }

    /// Add a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn get_command(&self) -> &[String] {
        &self.command
    }

    pub fn get_env(&self) -> &[String] {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn bind(&self) -> Option<&BindMount> {
        self.bind.as_ref()
    }

    pub fn get_limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Network mode for the sandbox; always isolated
    pub fn network_mode(&self) -> &'static str {
        NETWORK_MODE
    }
}
