//! Code runner for Codecell
//!
//! Validates requests, stages their source into a private workspace and
//! drives one disposable sandbox per request.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

pub use crate::runner::execute::{SandboxState, execute};

mod execute;
#[cfg(test)]
mod fake;

use crate::{
    config::{Config, Language},
    sandbox::{DockerBackend, SandboxBackend, SandboxError},
    types::{ExecutionRequest, ExecutionResult, ResourceLimits},
    workspace::{Workspace, WorkspaceError},
};

/// Errors that reject a request before any execution happens
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("source code must not be empty")]
    EmptySource,

    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),

    #[error("invalid resource limits: {0}")]
    InvalidLimits(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// High-level runner for code execution
///
/// Holds the configuration and a sandbox backend. Shared by reference across
/// any number of concurrent requests.
#[derive(Debug)]
pub struct Runner<B = DockerBackend> {
    config: Config,
    backend: Arc<B>,
}

impl Runner<DockerBackend> {
    /// Create a runner backed by the Docker daemon named in the config
    pub fn connect(config: Config) -> Result<Self, SandboxError> {
        let backend = DockerBackend::connect(config.docker_host.as_deref())?;
        Ok(Self::new(config, backend))
    }
}

impl<B: SandboxBackend + 'static> Runner<B> {
    /// Create a new runner with the given configuration and backend
    pub fn new(config: Config, backend: B) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the sandbox backend
    pub fn backend(&self) -> &B {
        self.backend.as_ref()
    }

    /// Check a request and resolve its language, without side effects
    pub fn validate(&self, request: &ExecutionRequest) -> Result<&Language, RequestError> {
        if request.source.is_empty() {
            return Err(RequestError::EmptySource);
        }
        self.config
            .get_language(&request.language)
            .map_err(|_| RequestError::UnsupportedLanguage(request.language.clone()))
    }

    /// Run a request end to end
    ///
    /// Rejections come back as [`RequestError`]. Once the workspace is staged
    /// every outcome, including sandbox failures and timeouts, is an
    /// [`ExecutionResult`], and the workspace is removed before returning.
    /// Dropping the future releases both the workspace and the sandbox.
    #[instrument(skip(self, request, limits), fields(language = %request.language))]
    pub async fn submit(
        &self,
        request: &ExecutionRequest,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, RequestError> {
        let language = self.validate(request)?;
        if let Some(limits) = limits {
            limits.validate().map_err(RequestError::InvalidLimits)?;
        }

        let mut workspace = Workspace::stage(
            &self.config.staging_dir,
            language.source_name.as_str(),
            &request.source,
        )
        .await?;

        let result = self.execute(language, &workspace, limits).await;
        workspace.unstage();

        info!(
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            wall_time = result.wall_time,
            "request finished"
        );

        Ok(result)
    }

    /// Run an already staged workspace
    pub async fn execute(
        &self,
        language: &Language,
        workspace: &Workspace,
        limits: Option<&ResourceLimits>,
    ) -> ExecutionResult {
        execute::execute(&self.backend, &self.config, language, workspace, limits).await
    }
}
