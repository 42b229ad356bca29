//! Backend-agnostic sandbox surface.
//!
//! Callers obtain a [`DevSandbox`] from a [`SandboxBackend`] and never learn
//! which backend produced it. The backend is picked once at startup from the
//! environment by [`select_backend`].

mod local;

pub use local::{LocalBackend, LocalSandbox};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::files::FileChunk;
use crate::runtime::{DockerRuntime, LazyRuntime};
use crate::store::{Project, ProjectStore};
use crate::{ProjectId, Result};

/// Credentials that switch on the remote managed-sandbox backend.
pub const REMOTE_TOKEN_ID_ENV: &str = "DEVBOX_REMOTE_TOKEN_ID";
/// See [`REMOTE_TOKEN_ID_ENV`].
pub const REMOTE_TOKEN_SECRET_ENV: &str = "DEVBOX_REMOTE_TOKEN_SECRET";

/// A project's running environment: files, commands and readiness.
#[async_trait]
pub trait DevSandbox: Send + Sync {
    /// Project this sandbox belongs to.
    fn project_id(&self) -> ProjectId;

    /// Whether [`wait_until_up`](Self::wait_until_up) has succeeded.
    fn is_ready(&self) -> bool;

    /// One readiness poll.
    async fn is_up(&self) -> bool;

    /// Poll until up; `NotReady` once attempts run out.
    async fn wait_until_up(&mut self) -> Result<()>;

    /// Run a shell command; failures come back as output text.
    async fn run_command(&self, command: &str, workdir: Option<&str>) -> String;

    /// Run a shell command, yielding its output as a one-item stream.
    fn run_command_stream(&self, command: &str, workdir: Option<&str>)
        -> BoxStream<'static, String>;

    /// Commit all changes and refresh the commit log.
    async fn commit_changes(&self, message: &str) -> String;

    /// Read a UTF-8 file. With `missing_ok`, an absent file reads as empty
    /// instead of `FileNotFound`.
    async fn read_file(&self, path: &str, missing_ok: bool) -> Result<String>;

    /// Whether a regular file exists at `path`.
    async fn has_file(&self, path: &str) -> bool;

    /// Stream a file in [`CHUNK_SIZE`](crate::CHUNK_SIZE) pieces, as text
    /// or raw bytes.
    async fn stream_file(
        &self,
        path: &str,
        binary: bool,
    ) -> Result<BoxStream<'static, Result<FileChunk>>>;

    /// Create or replace a file, creating parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Every file under `/app`, sorted, skipping ignored directories.
    async fn list_paths(&self) -> Result<Vec<String>>;
}

/// Creates, reuses and tears down project sandboxes.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Implementation behind this backend.
    fn kind(&self) -> BackendKind;

    /// Return the project's live sandbox, creating one if allowed.
    async fn get_or_create(
        &self,
        project_id: ProjectId,
        create_if_missing: bool,
    ) -> Result<Box<dyn DevSandbox>>;

    /// Stop and remove the project's container. Never fails.
    async fn destroy(&self, project: &Project);

    /// [`destroy`](Self::destroy), then delete the project's storage. Never fails.
    async fn destroy_all(&self, project: &Project);

    /// Read a stored file without a running sandbox.
    async fn read_project_file(&self, project: &Project, path: &str) -> Result<Option<Vec<u8>>>;

    /// Write a stored file without a running sandbox.
    async fn write_project_file(&self, project: &Project, path: &str, content: &str) -> Result<()>;
}

/// Which sandbox implementation serves this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Containers on the local Docker daemon.
    Local,
    /// Remote managed-sandbox provider.
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Remote when both remote credentials are set and non-empty, local otherwise.
pub fn select_backend(token_id: Option<&str>, token_secret: Option<&str>) -> BackendKind {
    let present = |v: Option<&str>| v.is_some_and(|v| !v.trim().is_empty());
    if present(token_id) && present(token_secret) {
        BackendKind::Remote
    } else {
        BackendKind::Local
    }
}

/// [`select_backend`] over the process environment.
pub fn select_backend_from_env() -> BackendKind {
    let id = std::env::var(REMOTE_TOKEN_ID_ENV).ok();
    let secret = std::env::var(REMOTE_TOKEN_SECRET_ENV).ok();
    select_backend(id.as_deref(), secret.as_deref())
}

/// Build the backend for `kind`, checking that the container daemon answers.
///
/// No remote implementation ships in this build, so `Remote` falls back to
/// local Docker with a warning.
pub async fn connect(
    kind: BackendKind,
    config: Config,
    store: Arc<dyn ProjectStore>,
) -> Result<Arc<dyn SandboxBackend>> {
    log_backend(kind);
    let runtime = DockerRuntime::connect().await?;
    Ok(Arc::new(LocalBackend::new(config, store, Arc::new(runtime))?))
}

/// Like [`connect`] but the daemon is only contacted once a container call is
/// made, so stored project files stay reachable on hosts without Docker.
pub fn open(
    kind: BackendKind,
    config: Config,
    store: Arc<dyn ProjectStore>,
) -> Result<Arc<dyn SandboxBackend>> {
    log_backend(kind);
    let runtime = LazyRuntime::docker();
    Ok(Arc::new(LocalBackend::new(config, store, Arc::new(runtime))?))
}

fn log_backend(kind: BackendKind) {
    match kind {
        BackendKind::Remote => {
            warn!(
                "Remote sandbox credentials found but remote backend is unavailable; \
                 falling back to local Docker"
            );
        }
        BackendKind::Local => debug!("Using local Docker sandbox backend"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_backend_local_without_credentials() {
        assert_eq!(select_backend(None, None), BackendKind::Local);
    }

    #[test]
    fn test_select_backend_needs_both_credentials() {
        assert_eq!(select_backend(Some("id"), None), BackendKind::Local);
        assert_eq!(select_backend(None, Some("secret")), BackendKind::Local);
    }

    #[test]
    fn test_select_backend_ignores_empty_credentials() {
        assert_eq!(select_backend(Some(""), Some("secret")), BackendKind::Local);
        assert_eq!(select_backend(Some("id"), Some("  ")), BackendKind::Local);
    }

    #[test]
    fn test_select_backend_remote_with_credentials() {
        assert_eq!(select_backend(Some("id"), Some("secret")), BackendKind::Remote);
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Local.to_string(), "local");
        assert_eq!(BackendKind::Remote.to_string(), "remote");
    }
}
