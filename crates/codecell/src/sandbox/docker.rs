//! Docker backend built on bollard
//!
//! Maps each sandbox lifecycle transition onto one Docker Engine API call.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    ListContainersOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder, WaitContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::{StreamExt, TryStreamExt};
use tracing::{debug, instrument};

use crate::sandbox::{
    Frame, MANAGED_LABEL, OutputStream, SandboxBackend, SandboxError, SandboxSpec, StreamKind,
};

/// Client timeout for Docker API requests, in seconds
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Docker Engine as a sandbox host
#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connect to the Docker daemon
    ///
    /// `host` accepts a socket path, a `unix://` URL or a `tcp://`/`http://`
    /// URL. Local defaults (including `DOCKER_HOST`) apply when `None`.
    pub fn connect(host: Option<&str>) -> Result<Self, SandboxError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => {
                let path = host.strip_prefix("unix://").unwrap_or(host);
                Docker::connect_with_socket(path, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| SandboxError::Connect(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Wrap an existing client
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Ids of all containers carrying the managed label, running or not
    pub async fn list_managed(&self) -> Result<Vec<String>, SandboxError> {
        let label = format!("{MANAGED_LABEL}=true");
        let filters: HashMap<&str, Vec<&str>> = HashMap::from([("label", vec![label.as_str()])]);
        let options = ListContainersOptionsBuilder::new()
            .all(true)
            .filters(&filters)
            .build();

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| SandboxError::Connect(e.to_string()))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    fn create_body(spec: &SandboxSpec) -> ContainerCreateBody {
        let limits = spec.get_limits();
        let env = spec.get_env().to_vec();

        ContainerCreateBody {
            image: Some(spec.image().to_owned()),
            cmd: Some(spec.get_command().to_vec()),
            env: if env.is_empty() { None } else { Some(env) },
            working_dir: spec.working_dir().map(str::to_owned),
            labels: Some(spec.labels().clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: spec.bind().map(|bind| vec![bind.to_bind_string()]),
                network_mode: Some(spec.network_mode().to_owned()),
                memory: limits.memory_bytes(),
                memory_swap: limits.memory_bytes(),
                nano_cpus: limits.nano_cpus(),
                pids_limit: limits.max_processes.map(i64::from),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        }
    }
}

fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn to_frame(output: LogOutput) -> Frame {
    match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => Frame::stdout(message),
        LogOutput::StdErr { message } => Frame::stderr(message),
        LogOutput::StdIn { message } => Frame::new(StreamKind::Stdin, message),
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    #[instrument(skip(self))]
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(SandboxError::PullFailed {
                    image: image.to_owned(),
                    message: e.to_string(),
                });
            }
        }

        let (from_image, tag) = match image.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (image, "latest"),
        };

        debug!(from_image, tag, "pulling image");

        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(from_image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| SandboxError::PullFailed {
                image: image.to_owned(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    #[instrument(skip(self, spec), fields(name = spec.name(), image = spec.image()))]
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        let options = CreateContainerOptionsBuilder::new().name(spec.name()).build();
        let body = Self::create_body(spec);

        let response = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| SandboxError::CreateFailed {
                image: spec.image().to_owned(),
                message: e.to_string(),
            })?;

        for warning in &response.warnings {
            debug!(%warning, "container create warning");
        }

        debug!(id = %response.id, "container created");
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn attach(&self, id: &str) -> Result<OutputStream, SandboxError> {
        let options = AttachContainerOptionsBuilder::new()
            .stream(true)
            .stdout(true)
            .stderr(true)
            .logs(true)
            .build();

        let attached = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| SandboxError::AttachFailed {
                id: id.to_owned(),
                message: e.to_string(),
            })?;

        let output = attached.output.map(|item| {
            item.map(to_frame)
                .map_err(|e| SandboxError::Output(e.to_string()))
        });

        Ok(output.boxed())
    }

    #[instrument(skip(self))]
    async fn start(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| SandboxError::StartFailed {
                id: id.to_owned(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn wait(&self, id: &str) -> Result<i64, SandboxError> {
        let mut stream = std::pin::pin!(
            self.docker
                .wait_container(id, None::<WaitContainerOptions>)
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::WaitFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
            None => Err(SandboxError::WaitFailed {
                id: id.to_owned(),
                message: "wait stream ended without a status".to_owned(),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn stop(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .stop_container(id, Some(StopContainerOptionsBuilder::new().t(0).build()))
            .await
            .map_err(|e| SandboxError::StopFailed {
                id: id.to_owned(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("container already gone");
                Ok(())
            }
            Err(e) => Err(SandboxError::RemoveFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
        }
    }
}
