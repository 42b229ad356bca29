//! Per-project development sandboxes.
//!
//! Each project gets one long-lived container bound to a host-side storage
//! directory. The library creates, reuses, probes and tears down that
//! container, and exposes a uniform file/command surface over it through
//! [`sandbox::DevSandbox`].

/// `devbox.toml` loading.
pub mod config;
/// Error type shared by the library.
pub mod error;
/// Shell commands inside a project container.
pub mod exec;
/// Host-mirrored project files.
pub mod files;
/// Per-project lifecycle locks.
pub mod lock;
/// Readiness polling.
pub mod probe;
/// Container runtime abstraction.
pub mod runtime;
/// Sandbox traits, backend selection and the local backend.
pub mod sandbox;
/// Project scaffolding.
pub mod scaffold;
/// Project and stack records.
pub mod store;
mod templates;

use std::time::Duration;

pub use error::{Result, SandboxError};

/// Identifier of a project record.
pub type ProjectId = u64;

/// Logical root under which every sandbox path is addressed.
pub const APP_ROOT: &str = "/app";

/// Port the development server listens on inside the container.
pub const SERVICE_PORT: u16 = 3000;

/// Delay between readiness polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Readiness polls before giving up.
pub const MAX_ATTEMPTS: u32 = 60;

/// Chunk size used when streaming files off the host mirror.
pub const CHUNK_SIZE: usize = 8192;

/// Directory names never listed from a project tree.
pub const IGNORED_DIRS: &[&str] = &[".git", "node_modules", ".next", "build", "tmp"];

/// Commit log written by `commit_changes`; hidden from listings.
pub const GIT_LOG_FILE: &str = "git.log";
