//! Domain-specific error types for sandbox operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

use std::path::PathBuf;

use crate::ProjectId;

/// Convenience alias used across the library.
pub type Result<T, E = SandboxError> = std::result::Result<T, E>;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// No project record exists for the identifier.
    #[error("Project not found: {project_id}")]
    ProjectNotFound {
        /// Identifier that was looked up.
        project_id: ProjectId,
    },

    /// The project's stack record does not exist.
    #[error("Stack not found: {stack_id}")]
    StackNotFound {
        /// Identifier that was looked up.
        stack_id: String,
    },

    /// A required file is absent from the host mirror.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path as the caller gave it.
        path: String,
    },

    /// The container is missing or never became reachable.
    #[error("Sandbox is not ready: {message}")]
    NotReady {
        /// What was missing.
        message: String,
    },

    /// Pushing a written file into the running container failed.
    #[error("Could not sync {path} to container: {message}")]
    SyncFailed {
        /// Sandbox path of the written file.
        path: String,
        /// Runtime failure.
        message: String,
    },

    /// A teardown step failed.
    #[error("Cleanup failed: {message}")]
    CleanupFailed {
        /// Step that failed.
        message: String,
    },

    /// The container runtime rejected a control-plane call.
    #[error("Container operation failed: {message}")]
    Runtime {
        /// Runtime failure.
        message: String,
    },

    /// Host filesystem failure other than a missing file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Host path being accessed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The project store could not be read or written.
    #[error("Project store error: {message}")]
    Store {
        /// Parse or write failure.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What was invalid.
        message: String,
    },
}

impl SandboxError {
    /// Creates a `ProjectNotFound` error.
    pub fn project_not_found(project_id: ProjectId) -> Self {
        Self::ProjectNotFound { project_id }
    }

    /// Creates a `StackNotFound` error.
    pub fn stack_not_found(stack_id: impl Into<String>) -> Self {
        Self::StackNotFound {
            stack_id: stack_id.into(),
        }
    }

    /// Creates a `FileNotFound` error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a `NotReady` error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Creates a `SyncFailed` error.
    pub fn sync_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SyncFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a `CleanupFailed` error.
    pub fn cleanup_failed(message: impl Into<String>) -> Self {
        Self::CleanupFailed {
            message: message.into(),
        }
    }

    /// Creates a `Runtime` error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Creates an `Io` error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `Store` error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a `Config` error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if a project, stack or file was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound { .. } | Self::StackNotFound { .. } | Self::FileNotFound { .. }
        )
    }

    /// Returns true if the sandbox was unavailable. Callers may retry the
    /// whole `get_or_create` flow.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}
