//! Sandbox lifecycle for one execution
//!
//! Provision, attach, start, wait under a deadline, drain, remove. Every
//! failure before removal is folded into the returned result's stderr, and
//! removal runs on every path once a sandbox exists, including when the
//! execution future is dropped part way.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, Language};
use crate::sandbox::{OutputBuffers, OutputStream, SandboxBackend, SandboxError, SandboxSpec};
use crate::types::{ExecutionResult, ResourceLimits};
use crate::workspace::Workspace;

/// How long to keep reading output after the process exits
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for termination after a deadline stop
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle states of one sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Started,
    Running,
    TimedOut,
    Waited,
    Removed,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Running => write!(f, "running"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Waited => write!(f, "waited"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Removes a provisioned sandbox in the background unless disarmed
///
/// Held across everything between create and the inline remove, so a
/// cancelled execution does not leave its container running on the host.
struct Teardown<B: SandboxBackend + ?Sized + 'static> {
    backend: Arc<B>,
    id: Option<String>,
}

impl<B: SandboxBackend + ?Sized + 'static> Teardown<B> {
    fn arm(backend: &Arc<B>, id: &str) -> Self {
        Self {
            backend: Arc::clone(backend),
            id: Some(id.to_owned()),
        }
    }

    fn disarm(&mut self) {
        self.id = None;
    }
}

impl<B: SandboxBackend + ?Sized + 'static> Drop for Teardown<B> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };

        let Ok(handle) = Handle::try_current() else {
            warn!(%id, "execution dropped outside a runtime, sandbox left behind");
            return;
        };

        warn!(%id, "execution cancelled, removing sandbox in the background");
        let backend = Arc::clone(&self.backend);
        handle.spawn(async move {
            if let Err(e) = backend.remove(&id).await {
                warn!(%id, error = %e, "failed to remove sandbox (ignored)");
            }
        });
    }
}

/// Run a staged workspace in a fresh sandbox and collect its output
#[instrument(skip_all, fields(language = %language.name))]
pub async fn execute<B: SandboxBackend + ?Sized + 'static>(
    backend: &Arc<B>,
    config: &Config,
    language: &Language,
    workspace: &Workspace,
    limits: Option<&ResourceLimits>,
) -> ExecutionResult {
    let limits = config.effective_limits(language, limits);
    let deadline = match limits.wall_time_limit.map(Duration::try_from_secs_f64) {
        None => Duration::MAX,
        Some(Ok(deadline)) => deadline,
        Some(Err(e)) => {
            warn!(error = %e, "unusable wall clock limit");
            return ExecutionResult::from_failure(format!("invalid wall_time_limit: {e}"));
        }
    };

    let request_id = Uuid::new_v4().to_string();
    let spec = SandboxSpec::new(format!("codecell-{request_id}"), &language.image)
        .command(language.command())
        .env(language.env().iter().cloned())
        .workspace(workspace.path(), &config.container_workdir)
        .limits(limits)
        .request_id(&request_id);

    if config.pull_missing_images
        && let Err(e) = backend.ensure_image(&language.image).await
    {
        warn!(error = %e, "image unavailable");
        return ExecutionResult::from_failure(e.to_string());
    }

    let id = match backend.create(&spec).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to provision sandbox");
            return ExecutionResult::from_failure(e.to_string());
        }
    };

    let mut teardown = Teardown::arm(backend, &id);
    let mut state = SandboxState::Created;
    debug!(%id, %state, "sandbox provisioned");

    let outcome = drive(&**backend, &id, deadline, &mut state).await;

    if let Err(e) = backend.remove(&id).await {
        warn!(%id, error = %e, "failed to remove sandbox (ignored)");
    }
    teardown.disarm();
    state = SandboxState::Removed;
    debug!(%id, %state, "sandbox torn down");

    match outcome {
        Ok(result) => {
            debug!(
                exit_code = ?result.exit_code,
                timed_out = result.timed_out,
                wall_time = result.wall_time,
                "execution complete"
            );
            result
        }
        Err(e) => {
            warn!(%id, error = %e, "execution failed");
            ExecutionResult::from_failure(e.to_string())
        }
    }
}

/// Everything between provisioning and removal
async fn drive<B: SandboxBackend + ?Sized>(
    backend: &B,
    id: &str,
    deadline: Duration,
    state: &mut SandboxState,
) -> Result<ExecutionResult, SandboxError> {
    // Attach first so output written right after start is not lost
    let output = backend.attach(id).await?;

    backend.start(id).await?;
    *state = SandboxState::Started;
    debug!(%id, %state, "sandbox started");

    let started_at = Instant::now();
    let (buffers, exit_code, timed_out) = collect(backend, id, output, deadline, state).await?;
    let wall_time = started_at.elapsed().as_secs_f64();

    let (stdout, stderr) = buffers.into_strings();

    Ok(ExecutionResult {
        stdout,
        stderr,
        exit_code,
        timed_out,
        wall_time,
    })
}

/// Demultiplex output while waiting for exit, enforcing the deadline
async fn collect<B: SandboxBackend + ?Sized>(
    backend: &B,
    id: &str,
    mut output: OutputStream,
    deadline: Duration,
    state: &mut SandboxState,
) -> Result<(OutputBuffers, Option<i64>, bool), SandboxError> {
    let mut buffers = OutputBuffers::new();
    let mut exit_code: Option<i64> = None;
    let mut timed_out = false;
    let mut channel_open = true;

    let wait = backend.wait(id);
    tokio::pin!(wait);

    let timer = sleep(deadline);
    tokio::pin!(timer);

    let drain = sleep(DRAIN_GRACE);
    tokio::pin!(drain);

    *state = SandboxState::Running;

    loop {
        tokio::select! {
            frame = output.next(), if channel_open => match frame {
                Some(Ok(frame)) => buffers.push(&frame),
                Some(Err(e)) => return Err(e),
                None => channel_open = false,
            },

            status = &mut wait, if exit_code.is_none() => {
                exit_code = Some(status?);
                *state = SandboxState::Waited;
                debug!(%id, %state, ?exit_code, "sandbox exited");
                // Disarms the deadline; from here only the drain timer runs
                drain.as_mut().reset(Instant::now() + DRAIN_GRACE);
            }

            _ = &mut timer, if exit_code.is_none() => {
                if timed_out {
                    warn!(%id, "sandbox did not terminate after stop, abandoning wait");
                    break;
                }
                timed_out = true;
                *state = SandboxState::TimedOut;
                warn!(%id, ?deadline, "deadline reached, stopping sandbox");
                if let Err(e) = backend.stop(id).await {
                    warn!(%id, error = %e, "failed to stop sandbox (ignored)");
                }
                timer.as_mut().reset(Instant::now() + STOP_GRACE);
            }

            _ = &mut drain, if exit_code.is_some() => {
                warn!(%id, "output channel still open after exit, giving up on it");
                break;
            }

            else => break,
        }

        if exit_code.is_some() && !channel_open {
            break;
        }
    }

    Ok((buffers, exit_code, timed_out))
}
