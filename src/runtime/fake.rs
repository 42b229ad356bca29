//! In-process container runtime for tests.
//!
//! Tracks containers in memory, records every call and unpacks uploaded
//! archives so tests can assert on what reached "the container".

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput};
use crate::{Result, SandboxError};

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub spec: ContainerSpec,
    pub running: bool,
    /// Files received through `upload`, keyed by absolute in-container path.
    pub files: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    creates: AtomicUsize,
    next_id: AtomicUsize,
    create_delay: Option<Duration>,
    execs: Mutex<Vec<(String, Vec<String>, String)>>,
    exec_responses: Mutex<VecDeque<Result<ExecOutput>>>,
    fail_uploads: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside `create` to widen race windows.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Queue a response for the next `exec` call.
    pub fn push_exec_response(&self, response: Result<ExecOutput>) {
        self.exec_responses.lock().unwrap().push_back(response);
    }

    /// Register a container that exists outside the manager's control.
    pub fn insert(&self, id: &str, running: bool) {
        let spec = ContainerSpec {
            name: id.to_string(),
            image: "fake".to_string(),
            command: String::new(),
            host_dir: std::path::PathBuf::new(),
            mount_point: crate::APP_ROOT.to_string(),
            container_port: crate::SERVICE_PORT,
            host_port: crate::SERVICE_PORT,
            labels: HashMap::new(),
        };
        self.containers.lock().unwrap().insert(
            id.to_string(),
            FakeContainer {
                spec,
                running,
                files: HashMap::new(),
            },
        );
    }

    /// Simulate the container's main process exiting.
    pub fn kill(&self, id: &str) {
        if let Some(c) = self.containers.lock().unwrap().get_mut(id) {
            c.running = false;
        }
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn container(&self, id: &str) -> Option<FakeContainer> {
        self.containers.lock().unwrap().get(id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>, String)> {
        self.execs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                running: true,
                files: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState> {
        let containers = self.containers.lock().unwrap();
        let c = containers
            .get(id)
            .ok_or_else(|| SandboxError::runtime(format!("No such container: {id}")))?;
        Ok(ContainerState {
            running: c.running,
            status: if c.running { "running" } else { "exited" }.to_string(),
        })
    }

    async fn exec(&self, id: &str, argv: &[String], workdir: &str) -> Result<ExecOutput> {
        self.execs
            .lock()
            .unwrap()
            .push((id.to_string(), argv.to_vec(), workdir.to_string()));

        if !self.containers.lock().unwrap().contains_key(id) {
            return Err(SandboxError::runtime(format!("No such container: {id}")));
        }

        self.exec_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutput::default()))
    }

    async fn upload(&self, id: &str, dir: &str, archive: Bytes) -> Result<()> {
        if self.fail_uploads {
            return Err(SandboxError::runtime("upload rejected"));
        }

        let mut containers = self.containers.lock().unwrap();
        let c = containers
            .get_mut(id)
            .ok_or_else(|| SandboxError::runtime(format!("No such container: {id}")))?;

        let mut tar = tar::Archive::new(archive.as_ref());
        for entry in tar.entries().map_err(|e| SandboxError::runtime(e.to_string()))? {
            let mut entry = entry.map_err(|e| SandboxError::runtime(e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| SandboxError::runtime(e.to_string()))?
                .to_string_lossy()
                .into_owned();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| SandboxError::runtime(e.to_string()))?;
            c.files
                .insert(format!("{}/{name}", dir.trim_end_matches('/')), content);
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let mut containers = self.containers.lock().unwrap();
        let c = containers
            .get_mut(id)
            .ok_or_else(|| SandboxError::runtime(format!("No such container: {id}")))?;
        c.running = false;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.containers
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SandboxError::runtime(format!("No such container: {id}")))
    }
}
