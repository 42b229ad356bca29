//! Container runtime collaborator.
//!
//! The lifecycle manager only needs a handful of control-plane calls; they
//! are collected behind [`ContainerRuntime`] so the Docker implementation can
//! be swapped for an in-process fake in tests.

mod docker;
#[cfg(test)]
pub(crate) mod fake;
mod lazy;

pub use docker::DockerRuntime;
pub use lazy::LazyRuntime;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::Result;

/// Everything needed to launch a project container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique on the daemon.
    pub name: String,
    /// Image reference, pulled when absent.
    pub image: String,
    /// Shell command run with `sh -c` as the container's main process.
    pub command: String,
    /// Host directory bound read-write at `mount_point`.
    pub host_dir: PathBuf,
    /// Container path `host_dir` is bound at.
    pub mount_point: String,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Host port `container_port` is published on.
    pub host_port: u16,
    /// Labels attached to the container.
    pub labels: HashMap<String, String>,
}

/// Observed state of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    /// Whether the main process is running.
    pub running: bool,
    /// Runtime-reported status text (`running`, `exited`, ...).
    pub status: String,
}

/// Captured output of an exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything the command wrote to standard output.
    pub stdout: String,
    /// Everything the command wrote to standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Control-plane operations on a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container, returning its identifier.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    /// Refresh the state of a container. Fails if the container is gone.
    async fn inspect(&self, id: &str) -> Result<ContainerState>;

    /// Run `argv` inside the container and capture its output.
    async fn exec(&self, id: &str, argv: &[String], workdir: &str) -> Result<ExecOutput>;

    /// Extract a tar archive into `dir` inside the container.
    async fn upload(&self, id: &str, dir: &str, archive: Bytes) -> Result<()>;

    /// Stop the container. Already stopped is not an error.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Force-remove the container.
    async fn remove(&self, id: &str) -> Result<()>;
}
