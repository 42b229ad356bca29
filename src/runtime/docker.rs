use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions, LogOutput,
    RemoveContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::{ContainerCreateResponse, HostConfig, PortBinding};
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, info, warn};

use super::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput};
use crate::{Result, SandboxError};

/// Seconds Docker waits for the main process before killing it on stop.
const STOP_GRACE_SECS: i64 = 10;

/// Runs project containers on the local Docker daemon
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon and make sure it answers.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::runtime(format!("Failed to connect to Docker. Is Docker running? {e}"))
        })?;

        docker.ping().await.map_err(|e| {
            SandboxError::runtime(format!("Cannot ping Docker daemon. Is Docker running? {e}"))
        })?;

        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn create_named(
        &self,
        name: &str,
        config: ContainerConfig<String>,
    ) -> Result<ContainerCreateResponse, DockerError> {
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
    }

    /// Pull `image` from its registry, logging progress.
    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image {}...", image);

        let pull_options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(pull_options), None, None);

        while let Some(chunk) = stream.next().await {
            let output = chunk
                .map_err(|e| SandboxError::runtime(format!("Error pulling image {image}: {e}")))?;
            if let Some(error) = &output.error {
                return Err(SandboxError::runtime(format!(
                    "Docker pull error for {image}: {error}"
                )));
            }
            if let Some(status) = &output.status {
                let trimmed = status.trim();
                if !trimmed.is_empty() {
                    debug!("{}: {}", image, trimmed);
                }
            }
        }

        info!("Pulled image {}", image);
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        debug!("Creating container: {}", spec.name);

        let config = build_container_config(spec)?;
        let created = match self.create_named(&spec.name, config.clone()).await {
            Err(e) if is_missing_image(&e) => {
                info!("Image {} not available locally", spec.image);
                self.pull_image(&spec.image).await?;
                self.create_named(&spec.name, config).await
            }
            created => created,
        }
        .map_err(|e| SandboxError::runtime(format!("Failed to create container: {e}")))?;

        for warning in &created.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        debug!("Starting container");
        let start = async {
            self.docker
                .start_container::<String>(&created.id, None)
                .await
                .map_err(|e| SandboxError::runtime(format!("Failed to start container: {e}")))
        };
        start_or_discard(start, self.remove(&created.id)).await?;

        info!("Started container {} ({})", spec.name, created.id);
        Ok(created.id)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| SandboxError::runtime(format!("Failed to inspect container {id}: {e}")))?;

        let state = response.state.unwrap_or_default();
        Ok(ContainerState {
            running: state.running.unwrap_or(false),
            status: state
                .status
                .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
        })
    }

    async fn exec(&self, id: &str, argv: &[String], workdir: &str) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(argv.to_vec()),
                    working_dir: Some(workdir.to_string()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::runtime(format!("Failed to create exec: {e}")))?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::runtime(format!("Failed to start exec: {e}")))?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        warn!("Error reading exec output: {}", e);
                    }
                    _ => {}
                }
            }
        }

        Ok(output)
    }

    async fn upload(&self, id: &str, dir: &str, archive: Bytes) -> Result<()> {
        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: dir.to_string(),
                    ..Default::default()
                }),
                archive,
            )
            .await
            .map_err(|e| SandboxError::runtime(format!("Failed to upload archive to {dir}: {e}")))
    }

    async fn stop(&self, id: &str) -> Result<()> {
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(SandboxError::runtime(format!(
                "Failed to stop container {id}: {e}"
            ))),
        }
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SandboxError::runtime(format!("Failed to remove container {id}: {e}")))
    }
}

/// Create fails with 404 when the image is not present on the daemon.
fn is_missing_image(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Await `start`. If it fails, await `discard` and return the start error.
async fn start_or_discard<S, D>(start: S, discard: D) -> Result<()>
where
    S: Future<Output = Result<()>>,
    D: Future<Output = Result<()>>,
{
    let Err(e) = start.await else {
        return Ok(());
    };
    if let Err(cleanup) = discard.await {
        warn!("{}", SandboxError::cleanup_failed(cleanup.to_string()));
    }
    Err(e)
}

fn build_container_config(spec: &ContainerSpec) -> Result<ContainerConfig<String>> {
    let host_dir = spec.host_dir.to_str().ok_or_else(|| {
        SandboxError::runtime(format!(
            "Invalid project path: {}",
            spec.host_dir.display()
        ))
    })?;
    let binds = vec![format!("{host_dir}:{}:rw", spec.mount_point)];

    let port_key = format!("{}/tcp", spec.container_port);
    let port_bindings = HashMap::from([(
        port_key.clone(),
        Some(vec![PortBinding {
            host_ip: None,
            host_port: Some(spec.host_port.to_string()),
        }]),
    )]);

    Ok(ContainerConfig {
        image: Some(spec.image.clone()),
        cmd: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            spec.command.clone(),
        ]),
        working_dir: Some(spec.mount_point.clone()),
        exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
        labels: Some(spec.labels.clone()),
        host_config: Some(HostConfig {
            binds: Some(binds),
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "devbox_project_1_abcd1234".to_string(),
            image: "node:18-alpine".to_string(),
            command: "cd /app && npm run dev".to_string(),
            host_dir: PathBuf::from("/tmp/devbox_projects/project_1"),
            mount_point: "/app".to_string(),
            container_port: 3000,
            host_port: 3100,
            labels: HashMap::from([("managed-by".to_string(), "devbox".to_string())]),
        }
    }

    #[test]
    fn test_container_config_binds_project_dir() {
        let config = build_container_config(&spec()).unwrap();
        let host = config.host_config.unwrap();
        assert_eq!(
            host.binds.unwrap(),
            vec!["/tmp/devbox_projects/project_1:/app:rw".to_string()]
        );
        assert_eq!(config.working_dir.as_deref(), Some("/app"));
    }

    #[test]
    fn test_container_config_maps_service_port() {
        let config = build_container_config(&spec()).unwrap();
        assert!(config.exposed_ports.unwrap().contains_key("3000/tcp"));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings["3000/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("3100"));
    }

    #[test]
    fn test_container_config_runs_command_through_shell() {
        let config = build_container_config(&spec()).unwrap();
        assert_eq!(
            config.cmd.unwrap(),
            vec!["sh", "-c", "cd /app && npm run dev"]
        );
        assert_eq!(
            config.labels.unwrap().get("managed-by").map(String::as_str),
            Some("devbox")
        );
    }

    #[test]
    fn test_missing_image_detected_from_not_found() {
        let missing = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: node:18-alpine".to_string(),
        };
        assert!(is_missing_image(&missing));

        let conflict = DockerError::DockerResponseServerError {
            status_code: 409,
            message: "Conflict. The container name is already in use".to_string(),
        };
        assert!(!is_missing_image(&conflict));
    }

    #[tokio::test]
    async fn test_failed_start_discards_container() {
        let discarded = AtomicBool::new(false);

        let result = start_or_discard(
            async { Err(SandboxError::runtime("port is already allocated")) },
            async {
                discarded.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("port is already allocated"));
        assert!(discarded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_discard_keeps_start_error() {
        let result = start_or_discard(
            async { Err(SandboxError::runtime("port is already allocated")) },
            async { Err(SandboxError::runtime("removal refused")) },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("port is already allocated"));
    }

    #[tokio::test]
    async fn test_successful_start_keeps_container() {
        let discarded = AtomicBool::new(false);

        start_or_discard(async { Ok(()) }, async {
            discarded.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert!(!discarded.load(Ordering::SeqCst));
    }
}
