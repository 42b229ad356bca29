//! CLI command implementations.
//!
//! Each submodule implements a devbox CLI command with pure formatting
//! separated from IO for testability.

pub mod down;
pub mod exec;
pub mod files;
pub mod project;
pub mod up;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use devbox::config::{self, Config};
use devbox::sandbox::{self, SandboxBackend};
use devbox::store::{Project, ProjectStore, TomlStore};
use devbox::ProjectId;

/// Configuration and project records for one CLI invocation.
pub struct Workspace {
    config: Config,
    store: Arc<TomlStore>,
}

impl Workspace {
    /// Resolve the home directory from the environment and load its contents.
    pub fn load() -> Result<Self> {
        let env_home = std::env::var(config::HOME_ENV).ok();
        let home = config::resolve_home(env_home.as_deref())?;
        Self::open(home)
    }

    pub fn open(home: PathBuf) -> Result<Self> {
        let config = Config::load(&home)?;
        let store = TomlStore::open(config.store_file(&home))
            .context("Failed to open project store")?;

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TomlStore {
        &self.store
    }

    pub fn project(&self, id: ProjectId) -> Result<Project> {
        Ok(self.store.project(id)?)
    }

    /// Backend with a verified connection to the container daemon.
    pub async fn backend(&self) -> Result<Arc<dyn SandboxBackend>> {
        let backend = sandbox::connect(
            sandbox::select_backend_from_env(),
            self.config.clone(),
            self.store.clone(),
        )
        .await?;
        Ok(backend)
    }

    /// Backend for stored-file access; the daemon is only contacted on demand.
    pub fn offline_backend(&self) -> Result<Arc<dyn SandboxBackend>> {
        let backend = sandbox::open(
            sandbox::select_backend_from_env(),
            self.config.clone(),
            self.store.clone(),
        )?;
        Ok(backend)
    }
}
