//! Scripted in-memory backend for runner tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::{mpsc, watch};

use crate::sandbox::{
    Frame, FrameDecoder, OutputStream, SandboxBackend, SandboxError, SandboxSpec,
};

/// What a fake program does once started
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Raw multiplexed chunks written to the output channel, in order
    pub chunks: Vec<Vec<u8>>,
    /// Pause before each chunk
    pub delay: Duration,
    /// Exit code reported on normal termination
    pub exit_code: i64,
    /// Keep running after the last chunk until stopped
    pub hang: bool,
}

impl Behavior {
    pub fn stdout(text: &str) -> Self {
        Self {
            chunks: vec![Frame::stdout(text.to_owned()).encode().unwrap()],
            ..Default::default()
        }
    }

    pub fn with_stderr(mut self, text: &str) -> Self {
        self.chunks.push(Frame::stderr(text.to_owned()).encode().unwrap());
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Lifecycle call that should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Create,
    Attach,
    Start,
    Wait,
    Stop,
    Remove,
}

type Program = dyn Fn(&str) -> Behavior + Send + Sync;

struct Container {
    spec: SandboxSpec,
    output_tx: Option<mpsc::UnboundedSender<Result<Frame, SandboxError>>>,
    output_rx: Option<mpsc::UnboundedReceiver<Result<Frame, SandboxError>>>,
    exit: watch::Sender<Option<i64>>,
    stopped: watch::Sender<bool>,
    removed: bool,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, Container>,
    stop_calls: usize,
    remove_calls: usize,
}

/// Backend that "runs" the staged source through a closure
///
/// The closure receives the entry file content read from the bind mount at
/// start time, so tests also observe what was staged.
#[derive(Clone)]
pub struct FakeBackend {
    program: Arc<Program>,
    fail: Option<Step>,
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new(program: impl Fn(&str) -> Behavior + Send + Sync + 'static) -> Self {
        Self {
            program: Arc::new(program),
            fail: None,
            state: Arc::default(),
        }
    }

    /// Echo the source back on stdout and exit 0
    pub fn echo() -> Self {
        Self::new(Behavior::stdout)
    }

    pub fn failing_at(mut self, step: Step) -> Self {
        self.fail = Some(step);
        self
    }

    pub fn created(&self) -> Vec<SandboxSpec> {
        let state = self.state.lock().unwrap();
        state.containers.values().map(|c| c.spec.clone()).collect()
    }

    pub fn live(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.containers.values().filter(|c| !c.removed).count()
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().unwrap().stop_calls
    }

    pub fn remove_calls(&self) -> usize {
        self.state.lock().unwrap().remove_calls
    }

    fn check(&self, step: Step) -> Result<(), SandboxError> {
        if self.fail == Some(step) {
            return Err(SandboxError::Output(format!("injected {step:?} failure")));
        }
        Ok(())
    }
}

fn read_entry(spec: &SandboxSpec) -> String {
    let Some(bind) = spec.bind() else {
        return String::new();
    };
    std::fs::read_dir(&bind.source)
        .ok()
        .and_then(|mut entries| entries.next())
        .and_then(|entry| entry.ok())
        .and_then(|entry| std::fs::read_to_string(entry.path()).ok())
        .unwrap_or_default()
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        self.check(Step::Create)?;
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let id = spec.name().to_owned();
        let container = Container {
            spec: spec.clone(),
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            exit: watch::channel(None).0,
            stopped: watch::channel(false).0,
            removed: false,
        };
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(id.clone(), container);
        Ok(id)
    }

    async fn attach(&self, id: &str) -> Result<OutputStream, SandboxError> {
        self.check(Step::Attach)?;
        let rx = self
            .state
            .lock()
            .unwrap()
            .containers
            .get_mut(id)
            .and_then(|c| c.output_rx.take())
            .ok_or_else(|| SandboxError::Output(format!("no such container {id}")))?;

        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(frames.boxed())
    }

    async fn start(&self, id: &str) -> Result<(), SandboxError> {
        self.check(Step::Start)?;
        let (spec, tx, exit, mut stopped) = {
            let mut state = self.state.lock().unwrap();
            let container = state
                .containers
                .get_mut(id)
                .ok_or_else(|| SandboxError::Output(format!("no such container {id}")))?;
            (
                container.spec.clone(),
                container.output_tx.take(),
                container.exit.clone(),
                container.stopped.subscribe(),
            )
        };
        let Some(tx) = tx else {
            return Err(SandboxError::Output("already started".to_owned()));
        };

        let behavior = (self.program)(&read_entry(&spec));

        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            for chunk in &behavior.chunks {
                if !behavior.delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(behavior.delay) => {}
                        _ = stopped.changed() => break,
                    }
                }
                decoder.push(chunk);
                while let Ok(Some(frame)) = decoder.next_frame() {
                    let _ = tx.send(Ok(frame));
                }
            }

            let already_stopped = *stopped.borrow();
            let code = if already_stopped {
                137
            } else if behavior.hang {
                let _ = stopped.changed().await;
                137
            } else {
                behavior.exit_code
            };

            exit.send_replace(Some(code));
            drop(tx);
        });

        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64, SandboxError> {
        self.check(Step::Wait)?;
        let mut exit = self
            .state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(|c| c.exit.subscribe())
            .ok_or_else(|| SandboxError::Output(format!("no such container {id}")))?;

        let code = *exit
            .wait_for(Option::is_some)
            .await
            .map_err(|e| SandboxError::Output(e.to_string()))?;
        Ok(code.unwrap_or_default())
    }

    async fn stop(&self, id: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.stop_calls += 1;
        // Termination happens even when the call reports failure, as with an
        // instance that is already gone
        if let Some(container) = state.containers.get(id) {
            container.stopped.send_replace(true);
        }
        drop(state);
        self.check(Step::Stop)
    }

    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.remove_calls += 1;
        if self.fail == Some(Step::Remove) {
            return Err(SandboxError::RemoveFailed {
                id: id.to_owned(),
                message: "injected failure".to_owned(),
            });
        }
        if let Some(container) = state.containers.get_mut(id) {
            container.stopped.send_replace(true);
            container.removed = true;
        }
        Ok(())
    }
}
