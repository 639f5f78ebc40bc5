//! A library for sandboxed code execution.
//!
//! Codecell runs untrusted source code in disposable Docker containers. Each
//! request gets its own staging directory and its own container, with no
//! network, a memory ceiling and a hard wall clock deadline. Output is
//! demultiplexed into stdout and stderr, and every resource is released on
//! every exit path.
//!
//! # Features
//!
//! - **Per-request isolation**: one workspace and one container per request, never reused.
//! - **Multi-language**: compiled and interpreted languages from a TOML registry.
//! - **Deadline enforcement**: runaway programs are stopped and reported as timed out.
//! - **Pluggable backend**: the runner drives any [`SandboxBackend`]; [`DockerBackend`] is the default.
//! - **Trace lines**: helpers to parse the `__VIS__:` visualization protocol from stdout.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{RequestError, Runner, SandboxState};
pub use sandbox::{
    DemuxError, DockerBackend, Frame, FrameDecoder, OutputBuffers, SandboxBackend, SandboxError,
    SandboxSpec, StreamKind,
};
pub use trace::TraceStep;
pub use types::{ExecutionRequest, ExecutionResult, ResourceLimits};
pub use workspace::{Workspace, WorkspaceError};

pub mod config;
pub mod runner;
pub mod sandbox;
pub mod trace;
pub mod types;
pub mod workspace;
