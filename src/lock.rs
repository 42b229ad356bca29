//! Per-project lifecycle locks.
//!
//! One async mutex per project identifier, created on first access and kept
//! for the life of the process. Entries are never evicted, so the registry
//! grows with the number of distinct projects seen.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use crate::ProjectId;

/// Lock handle shared by every caller for one project.
pub type ProjectLock = Arc<Mutex<()>>;

/// Lazily created lock per project.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<ProjectId, ProjectLock>,
}

impl LockRegistry {
    /// Registry independent of [`global`](Self::global).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<LockRegistry> {
        static GLOBAL: OnceLock<Arc<LockRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LockRegistry::new())))
    }

    /// Returns the lock for `project_id`, creating it on first access.
    ///
    /// `entry` holds the shard write lock across the insert, so concurrent
    /// first callers all observe the same instance.
    pub fn acquire(&self, project_id: ProjectId) -> ProjectLock {
        self.locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of projects that have a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no project has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
