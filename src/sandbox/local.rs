//! Local container lifecycle.
//!
//! Every lifecycle transition for a project runs under that project's lock:
//! resolve the records, assign storage, find a live container or launch a
//! new one bound to the storage directory. File and command access on the
//! returned sandbox is not serialized.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{BackendKind, DevSandbox, SandboxBackend};
use crate::config::Config;
use crate::exec::CommandExecutor;
use crate::files::{FileBridge, FileChunk};
use crate::lock::LockRegistry;
use crate::probe::{self, HttpReachability, Reachability, ReadinessPolicy};
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::scaffold;
use crate::store::{Project, ProjectStore, Stack};
use crate::{ProjectId, Result, SandboxError, APP_ROOT, SERVICE_PORT};

/// Sandbox backed by a container on the local runtime.
pub struct LocalSandbox {
    project_id: ProjectId,
    container_id: String,
    project_dir: PathBuf,
    ready: bool,
    runtime: Arc<dyn ContainerRuntime>,
    reachability: Arc<dyn Reachability>,
    policy: ReadinessPolicy,
    files: FileBridge,
    executor: CommandExecutor,
}

impl LocalSandbox {
    /// Container serving this sandbox.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Host directory bound at `/app`.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

#[async_trait]
impl DevSandbox for LocalSandbox {
    fn project_id(&self) -> ProjectId {
        self.project_id
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn is_up(&self) -> bool {
        probe::is_up(
            self.runtime.as_ref(),
            &self.container_id,
            self.reachability.as_ref(),
        )
        .await
    }

    async fn wait_until_up(&mut self) -> Result<()> {
        probe::wait_until_up(
            self.runtime.as_ref(),
            &self.container_id,
            self.reachability.as_ref(),
            self.policy,
        )
        .await?;
        self.ready = true;
        Ok(())
    }

    async fn run_command(&self, command: &str, workdir: Option<&str>) -> String {
        self.executor.run(command, workdir).await
    }

    fn run_command_stream(
        &self,
        command: &str,
        workdir: Option<&str>,
    ) -> BoxStream<'static, String> {
        self.executor.run_stream(command, workdir)
    }

    async fn commit_changes(&self, message: &str) -> String {
        self.executor.commit(message).await
    }

    async fn read_file(&self, path: &str, missing_ok: bool) -> Result<String> {
        self.files.read(path, missing_ok).await
    }

    async fn has_file(&self, path: &str) -> bool {
        self.files.exists(path).await
    }

    async fn stream_file(
        &self,
        path: &str,
        binary: bool,
    ) -> Result<BoxStream<'static, Result<FileChunk>>> {
        self.files.stream_read(path, binary).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.files.write(path, content).await
    }

    async fn list_paths(&self) -> Result<Vec<String>> {
        self.files.list_paths().await
    }
}

/// Lifecycle manager for containers on a local runtime.
pub struct LocalBackend {
    config: Config,
    store: Arc<dyn ProjectStore>,
    runtime: Arc<dyn ContainerRuntime>,
    reachability: Arc<dyn Reachability>,
    locks: Arc<LockRegistry>,
    policy: ReadinessPolicy,
}

impl LocalBackend {
    /// Backend probing `probe_host:host_port` over HTTP, using the
    /// process-wide lock registry.
    pub fn new(
        config: Config,
        store: Arc<dyn ProjectStore>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let reachability = HttpReachability::new(
            &config.readiness.probe_host,
            config.sandbox.host_port,
            config.readiness.request_timeout(),
        )?;

        Ok(Self {
            config,
            store,
            runtime,
            reachability: Arc::new(reachability),
            locks: LockRegistry::global(),
            policy: ReadinessPolicy::default(),
        })
    }

    /// Replace the HTTP reachability check.
    pub fn with_reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    /// Use `locks` instead of the process-wide registry.
    pub fn with_locks(mut self, locks: Arc<LockRegistry>) -> Self {
        self.locks = locks;
        self
    }

    /// Override the poll cadence of `wait_until_up`.
    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Typed form of [`SandboxBackend::get_or_create`].
    pub async fn get_or_create_local(
        &self,
        project_id: ProjectId,
        create_if_missing: bool,
    ) -> Result<LocalSandbox> {
        let lock = self.locks.acquire(project_id);
        let _guard = lock.lock().await;

        let mut project = self.store.project(project_id)?;
        let stack = self.store.stack(&project.stack_id)?;
        let project_dir = self.resolve_project_dir(&mut project).await?;

        let container_id = match self.live_container(&project).await {
            Some(id) => id,
            None if !create_if_missing => {
                return Err(SandboxError::not_ready(format!(
                    "Sandbox is not ready for project {project_id}"
                )));
            }
            None => self.launch(&mut project, &stack, &project_dir).await?,
        };

        Ok(self.sandbox(project_id, container_id, project_dir))
    }

    fn sandbox(
        &self,
        project_id: ProjectId,
        container_id: String,
        project_dir: PathBuf,
    ) -> LocalSandbox {
        let files = FileBridge::new(&project_dir).with_container(
            Arc::clone(&self.runtime),
            &container_id,
            self.config.sync.push_writes,
        );
        let executor = CommandExecutor::new(Arc::clone(&self.runtime), &container_id);

        LocalSandbox {
            project_id,
            container_id,
            project_dir,
            ready: false,
            runtime: Arc::clone(&self.runtime),
            reachability: Arc::clone(&self.reachability),
            policy: self.policy,
            files,
            executor,
        }
    }

    /// Reuse the assigned storage directory or allocate one under the
    /// scratch root, persisting the assignment. Caller holds the lock.
    async fn resolve_project_dir(&self, project: &mut Project) -> Result<PathBuf> {
        let dir = match &project.local_project_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = self
                    .config
                    .scratch_root()
                    .join(format!("project_{}", project.id));
                project.local_project_dir = Some(dir.clone());
                self.store.save_project(project)?;
                debug!("Assigned {} to project {}", dir.display(), project.id);
                dir
            }
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SandboxError::io(&dir, e))?;
        Ok(dir)
    }

    /// The project's container if it exists and is running.
    async fn live_container(&self, project: &Project) -> Option<String> {
        let id = project.local_container_id.as_deref()?;
        match self.runtime.inspect(id).await {
            Ok(state) if state.running => Some(id.to_string()),
            Ok(state) => {
                debug!("Container {} is {}, treating as absent", id, state.status);
                None
            }
            Err(e) => {
                debug!("Container {} unavailable, treating as absent: {}", id, e);
                None
            }
        }
    }

    async fn launch(
        &self,
        project: &mut Project,
        stack: &Stack,
        project_dir: &Path,
    ) -> Result<String> {
        info!("Creating new container for project {}", project.id);

        if let Some(stale) = project.local_container_id.as_deref() {
            if let Err(e) = self.runtime.remove(stale).await {
                warn!("{}", SandboxError::cleanup_failed(e.to_string()));
            }
        }

        if is_empty_dir(project_dir).await? {
            scaffold::initialize_project(project_dir, stack, project.id).await?;
        }

        let spec = self.container_spec(project.id, project_dir);
        let container_id = self.runtime.create(&spec).await?;

        project.local_container_id = Some(container_id.clone());
        self.store.save_project(project)?;

        info!(
            "Created container {} for project {}",
            container_id, project.id
        );
        Ok(container_id)
    }

    fn container_spec(&self, project_id: ProjectId, project_dir: &Path) -> ContainerSpec {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let sandbox = &self.config.sandbox;

        ContainerSpec {
            name: format!("{}_{}_{}", sandbox.name_prefix, project_id, &suffix[..8]),
            image: sandbox.image.clone(),
            command: sandbox.command.clone(),
            host_dir: project_dir.to_path_buf(),
            mount_point: APP_ROOT.to_string(),
            container_port: SERVICE_PORT,
            host_port: sandbox.host_port,
            labels: HashMap::from([
                ("managed-by".to_string(), "devbox".to_string()),
                ("devbox.project".to_string(), project_id.to_string()),
            ]),
        }
    }

    /// Stop and remove, logging instead of failing. Caller holds the lock.
    async fn destroy_container(&self, project: &Project) {
        let Some(id) = project.local_container_id.as_deref() else {
            return;
        };

        if let Err(e) = self.runtime.stop(id).await {
            warn!("{}", SandboxError::cleanup_failed(e.to_string()));
        }
        if let Err(e) = self.runtime.remove(id).await {
            warn!("{}", SandboxError::cleanup_failed(e.to_string()));
        } else {
            info!("Removed container {} for project {}", id, project.id);
        }
    }
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn get_or_create(
        &self,
        project_id: ProjectId,
        create_if_missing: bool,
    ) -> Result<Box<dyn DevSandbox>> {
        let sandbox = self
            .get_or_create_local(project_id, create_if_missing)
            .await?;
        Ok(Box::new(sandbox))
    }

    async fn destroy(&self, project: &Project) {
        let lock = self.locks.acquire(project.id);
        let _guard = lock.lock().await;
        self.destroy_container(project).await;
    }

    async fn destroy_all(&self, project: &Project) {
        let lock = self.locks.acquire(project.id);
        let _guard = lock.lock().await;

        self.destroy_container(project).await;

        let Some(dir) = project.local_project_dir.as_deref() else {
            return;
        };
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!("Removed project directory {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "{}",
                SandboxError::cleanup_failed(format!(
                    "Failed to remove {}: {e}",
                    dir.display()
                ))
            ),
        }
    }

    async fn read_project_file(&self, project: &Project, path: &str) -> Result<Option<Vec<u8>>> {
        match project.local_project_dir.as_deref() {
            Some(dir) => FileBridge::new(dir).read_bytes(path).await,
            None => Ok(None),
        }
    }

    async fn write_project_file(&self, project: &Project, path: &str, content: &str) -> Result<()> {
        let lock = self.locks.acquire(project.id);
        let _guard = lock.lock().await;

        let mut record = self.store.project(project.id)?;
        let dir = self.resolve_project_dir(&mut record).await?;
        FileBridge::new(dir).write(path, content).await
    }
}

async fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SandboxError::io(dir, e))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| SandboxError::io(dir, e))?;
    Ok(first.is_none())
}
