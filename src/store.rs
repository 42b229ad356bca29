//! Project and stack records.
//!
//! Records are owned by an external store; the lifecycle manager only reads
//! them and writes back the storage directory and container identifier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{ProjectId, Result, SandboxError};

/// A project and the local resources assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Stack the project is built on.
    pub stack_id: String,
    /// Host directory bound into the container, assigned on first use.
    #[serde(default)]
    pub local_project_dir: Option<PathBuf>,
    /// Container last launched for this project.
    #[serde(default)]
    pub local_container_id: Option<String>,
}

impl Project {
    /// Record with no directory or container assigned yet.
    pub fn new(id: ProjectId, stack_id: impl Into<String>) -> Self {
        Self {
            id,
            stack_id: stack_id.into(),
            local_project_dir: None,
            local_container_id: None,
        }
    }
}

/// Technology stack a project is scaffolded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Scaffold template materialized on first initialization.
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "nextjs".to_string()
}

/// Lookup and field-level update of project records.
pub trait ProjectStore: Send + Sync {
    /// Fetch a project by identifier.
    fn project(&self, id: ProjectId) -> Result<Project>;

    /// Fetch a stack by identifier.
    fn stack(&self, id: &str) -> Result<Stack>;

    /// Persist an updated project record.
    fn save_project(&self, project: &Project) -> Result<()>;
}

/// In-memory store, for embedding callers and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: Mutex<HashMap<ProjectId, Project>>,
    stacks: Mutex<HashMap<String, Stack>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stack record.
    pub fn insert_stack(&self, stack: Stack) {
        lock(&self.stacks).insert(stack.id.clone(), stack);
    }

    /// Insert or replace a project record.
    pub fn insert_project(&self, project: Project) {
        lock(&self.projects).insert(project.id, project);
    }
}

impl ProjectStore for MemoryStore {
    fn project(&self, id: ProjectId) -> Result<Project> {
        lock(&self.projects)
            .get(&id)
            .cloned()
            .ok_or_else(|| SandboxError::project_not_found(id))
    }

    fn stack(&self, id: &str) -> Result<Stack> {
        lock(&self.stacks)
            .get(id)
            .cloned()
            .ok_or_else(|| SandboxError::stack_not_found(id))
    }

    fn save_project(&self, project: &Project) -> Result<()> {
        lock(&self.projects).insert(project.id, project.clone());
        Ok(())
    }
}

/// On-disk layout of the TOML store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    stacks: Vec<Stack>,
}

/// Store backed by a single TOML document, rewritten on every save.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl TomlStore {
    /// Open the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| SandboxError::io(&path, e))?;
            toml::from_str(&content).map_err(|e| {
                SandboxError::store(format!(
                    "Failed to parse store file {}: {e}",
                    path.display()
                ))
            })?
        } else {
            StoreDocument::default()
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a stack record and persist.
    pub fn put_stack(&self, stack: Stack) -> Result<()> {
        let mut doc = lock(&self.doc);
        doc.stacks.retain(|s| s.id != stack.id);
        doc.stacks.push(stack);
        self.write(&doc)
    }

    /// Insert or replace a project record and persist.
    pub fn put_project(&self, project: Project) -> Result<()> {
        self.save_project(&project)
    }

    fn write(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SandboxError::io(parent, e))?;
        }

        let content = toml::to_string_pretty(doc)
            .map_err(|e| SandboxError::store(format!("Failed to serialize store: {e}")))?;

        fs::write(&self.path, content).map_err(|e| SandboxError::io(&self.path, e))
    }
}

impl ProjectStore for TomlStore {
    fn project(&self, id: ProjectId) -> Result<Project> {
        lock(&self.doc)
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| SandboxError::project_not_found(id))
    }

    fn stack(&self, id: &str) -> Result<Stack> {
        lock(&self.doc)
            .stacks
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| SandboxError::stack_not_found(id))
    }

    fn save_project(&self, project: &Project) -> Result<()> {
        let mut doc = lock(&self.doc);
        match doc.projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project.clone(),
            None => doc.projects.push(project.clone()),
        }
        self.write(&doc)
    }
}

// A poisoned store mutex only means another thread panicked mid-update;
// the document itself is still a valid value.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn nextjs() -> Stack {
        Stack {
            id: "nextjs".to_string(),
            name: "Next.js".to_string(),
            template: "nextjs".to_string(),
        }
    }

    #[test]
    fn test_memory_store_lookup() {
        let store = MemoryStore::new();
        store.insert_stack(nextjs());
        store.insert_project(Project::new(1, "nextjs"));

        assert_eq!(store.project(1).unwrap().stack_id, "nextjs");
        assert_eq!(store.stack("nextjs").unwrap().name, "Next.js");
        assert!(store.project(2).unwrap_err().is_not_found());
        assert!(store.stack("rails").unwrap_err().is_not_found());
    }

    #[test]
    fn test_toml_store_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.toml");

        let store = TomlStore::open(&path).unwrap();
        store.put_stack(nextjs()).unwrap();
        let mut project = Project::new(7, "nextjs");
        project.local_project_dir = Some(PathBuf::from("/tmp/devbox_projects/project_7"));
        project.local_container_id = Some("abc123".to_string());
        store.put_project(project.clone()).unwrap();

        let reopened = TomlStore::open(&path).unwrap();
        assert_eq!(reopened.project(7).unwrap(), project);
        assert_eq!(reopened.stack("nextjs").unwrap(), nextjs());
    }

    #[test]
    fn test_toml_store_save_replaces_record() {
        let dir = tempdir().unwrap();
        let store = TomlStore::open(dir.path().join("projects.toml")).unwrap();
        store.put_project(Project::new(1, "nextjs")).unwrap();

        let mut project = store.project(1).unwrap();
        project.local_container_id = Some("new-id".to_string());
        store.save_project(&project).unwrap();

        let reopened = TomlStore::open(store.path()).unwrap();
        assert_eq!(
            reopened.project(1).unwrap().local_container_id.as_deref(),
            Some("new-id")
        );
    }

    #[test]
    fn test_toml_store_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = TomlStore::open(dir.path().join("none.toml")).unwrap();
        assert!(store.project(1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_stack_template_defaults_to_nextjs() {
        let stack: Stack = toml::from_str("id = \"web\"\nname = \"Web\"").unwrap();
        assert_eq!(stack.template, "nextjs");
    }
}
