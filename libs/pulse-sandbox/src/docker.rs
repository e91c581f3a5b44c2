// Docker container management using Bollard
use crate::error::RuntimeError;
use crate::runtime::{BuildRequest, ContainerRuntime, ContainerSpec, CreatedContainer};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Seconds a timed-out container gets between SIGTERM and SIGKILL
const STOP_GRACE_SECS: i64 = 1;

/// Long-lived Docker client shared by every execution
#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect through the local socket or `DOCKER_HOST`
    pub fn connect_local() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }

    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }
}

/// A 404 on removal means the object is already gone
fn ignore_missing(result: Result<(), BollardError>) -> Result<(), RuntimeError> {
    match result {
        Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
        other => other.map_err(RuntimeError::from),
    }
}

#[async_trait]
impl ContainerRuntime for DockerManager {
    async fn build_image(&self, request: BuildRequest) -> Result<(), RuntimeError> {
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            labels: request.labels.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(request.context_tar.into()));

        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Daemon(error));
            }
            if let Some(line) = info.stream {
                trace!(tag = %request.tag, "{}", line.trim_end());
            }
        }

        debug!(tag = %request.tag, "Image built");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mount = Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(spec.mount_source.to_string_lossy().into_owned()),
            target: Some(spec.mount_target.clone()),
            read_only: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                mounts: Some(vec![mount]),
                memory: Some(spec.memory_limit_bytes),
                memory_swap: Some(spec.memory_limit_bytes),
                nano_cpus: Some(spec.nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Bollard reports a non-zero exit as an error; the container did finish
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Daemon("wait stream ended without a status".to_string())),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await?;
        Ok(())
    }

    async fn container_logs(&self, id: &str) -> Result<Vec<u8>, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut output = Vec::new();
        let mut stream = self.docker.logs(id, Some(options));
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => output.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(output)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        ignore_missing(self.docker.remove_container(id, Some(options)).await)
    }

    async fn list_created_containers(&self, label: &str) -> Result<Vec<CreatedContainer>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["created".to_string()]);
        filters.insert("label".to_string(), vec![label.to_string()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                c.id.map(|id| CreatedContainer {
                    id,
                    created: c.created.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove_image(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveImageOptions {
            force,
            noprune: false,
        };
        ignore_missing(
            self.docker
                .remove_image(name, Some(options), None)
                .await
                .map(|_| ()),
        )
    }

    async fn list_dangling_images(&self, label: &str) -> Result<Vec<String>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("dangling".to_string(), vec!["true".to_string()]);
        filters.insert("label".to_string(), vec![label.to_string()]);

        let options = ListImagesOptions {
            filters,
            ..Default::default()
        };

        let images = self.docker.list_images(Some(options)).await?;
        Ok(images.into_iter().map(|image| image.id).collect())
    }
}
