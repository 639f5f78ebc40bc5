//! Container sandbox plumbing
//!
//! This module provides the backend seam the runner drives (create, attach,
//! start, wait, stop, remove), the provisioning spec builder, and the
//! demultiplexer for the combined output channel.
//!
//! References for the attach stream framing:
//! - https://docs.docker.com/engine/api/v1.47/#tag/Container/operation/ContainerAttach

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use crate::sandbox::demux::{DemuxError, Frame, FrameDecoder, OutputBuffers, StreamKind};
pub use crate::sandbox::docker::DockerBackend;
pub use crate::sandbox::spec::{BindMount, SandboxSpec};

mod demux;
mod docker;
mod spec;

/// Label marking containers provisioned by codecell
pub const MANAGED_LABEL: &str = "codecell.managed";

/// Label carrying the id of the request a container belongs to
pub const REQUEST_LABEL: &str = "codecell.request";

/// Errors that occur during sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("failed to create sandbox from image '{image}': {message}")]
    CreateFailed { image: String, message: String },

    #[error("failed to attach to sandbox {id}: {message}")]
    AttachFailed { id: String, message: String },

    #[error("failed to start sandbox {id}: {message}")]
    StartFailed { id: String, message: String },

    #[error("failed waiting for sandbox {id}: {message}")]
    WaitFailed { id: String, message: String },

    #[error("failed to stop sandbox {id}: {message}")]
    StopFailed { id: String, message: String },

    #[error("failed to remove sandbox {id}: {message}")]
    RemoveFailed { id: String, message: String },

    #[error("failed to pull image '{image}': {message}")]
    PullFailed { image: String, message: String },

    #[error("output channel error: {0}")]
    Output(String),

    #[error("malformed output frame: {0}")]
    Demux(#[from] DemuxError),
}

/// Stream of demultiplexed frames from a sandbox's combined output channel
pub type OutputStream = BoxStream<'static, Result<Frame, SandboxError>>;

/// A container runtime able to host sandboxes
///
/// Each method maps to one lifecycle transition. Implementations must be safe
/// to share across concurrent requests; the runner never shares a sandbox id
/// between requests.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Make sure `image` is present on the host, fetching it if needed
    async fn ensure_image(&self, _image: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    /// Provision a sandbox and return its id. The process is not started.
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError>;

    /// Attach to the combined output channel. Called before [`start`](Self::start).
    async fn attach(&self, id: &str) -> Result<OutputStream, SandboxError>;

    /// Start the entry process
    async fn start(&self, id: &str) -> Result<(), SandboxError>;

    /// Wait for the entry process to terminate and return its exit code
    async fn wait(&self, id: &str) -> Result<i64, SandboxError>;

    /// Forcibly terminate the entry process
    async fn stop(&self, id: &str) -> Result<(), SandboxError>;

    /// Remove the sandbox from the host
    async fn remove(&self, id: &str) -> Result<(), SandboxError>;
}
