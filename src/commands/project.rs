//! Register projects and stacks in the local store.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;

use devbox::scaffold::Template;
use devbox::store::{Project, ProjectStore, Stack, TomlStore};
use devbox::ProjectId;

use super::Workspace;

/// Record to save for `project add`: existing records keep their storage and
/// container assignment, only the stack changes.
pub fn upsert_project(existing: Option<Project>, id: ProjectId, stack_id: &str) -> Project {
    match existing {
        Some(mut project) => {
            project.stack_id = stack_id.to_string();
            project
        }
        None => Project::new(id, stack_id),
    }
}

/// Format the result of `project add`.
pub fn format_project_added(project: &Project, stack: &Stack) -> String {
    let mut out = String::new();
    writeln!(
        &mut out,
        "{} Project {} uses stack {} ({})",
        "✓".green(),
        project.id.to_string().cyan(),
        stack.id.cyan(),
        stack.name.dimmed()
    )
    .unwrap();
    out
}

/// Format the result of `stack add`.
pub fn format_stack_added(stack: &Stack) -> String {
    let mut out = String::new();
    writeln!(
        &mut out,
        "{} Stack {} ({}) with {} template",
        "✓".green(),
        stack.id.cyan(),
        stack.name,
        stack.template.cyan()
    )
    .unwrap();
    out
}

fn add_project_to(store: &TomlStore, id: ProjectId, stack_id: &str) -> Result<(Project, Stack)> {
    let stack = store.stack(stack_id)?;
    let existing = store.project(id).ok();
    let project = upsert_project(existing, id, stack_id);
    store.put_project(project.clone())?;
    Ok((project, stack))
}

/// Entry point for `project add`.
pub fn run_add_project(workspace: &Workspace, id: ProjectId, stack_id: &str) -> Result<()> {
    let (project, stack) = add_project_to(workspace.store(), id, stack_id)
        .with_context(|| format!("Failed to add project {id}"))?;
    print!("{}", format_project_added(&project, &stack));
    Ok(())
}

/// Entry point for `stack add`.
pub fn run_add_stack(
    workspace: &Workspace,
    id: &str,
    name: &str,
    template: Template,
) -> Result<()> {
    let stack = Stack {
        id: id.to_string(),
        name: name.to_string(),
        template: template.to_string(),
    };
    workspace
        .store()
        .put_stack(stack.clone())
        .with_context(|| format!("Failed to add stack {id}"))?;
    print!("{}", format_stack_added(&stack));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn stack() -> Stack {
        Stack {
            id: "web".to_string(),
            name: "Web app".to_string(),
            template: "nextjs".to_string(),
        }
    }

    #[test]
    fn test_upsert_new_project() {
        let project = upsert_project(None, 4, "web");
        assert_eq!(project, Project::new(4, "web"));
    }

    #[test]
    fn test_upsert_keeps_assignments() {
        let mut existing = Project::new(4, "old");
        existing.local_project_dir = Some(PathBuf::from("/tmp/p4"));
        existing.local_container_id = Some("abc".to_string());

        let project = upsert_project(Some(existing), 4, "web");

        assert_eq!(project.stack_id, "web");
        assert_eq!(project.local_project_dir, Some(PathBuf::from("/tmp/p4")));
        assert_eq!(project.local_container_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_add_project_requires_stack() {
        let dir = tempdir().unwrap();
        let store = TomlStore::open(dir.path().join("projects.toml")).unwrap();

        let err = add_project_to(&store, 1, "web").unwrap_err();
        assert!(err.to_string().contains("Stack not found"));

        store.put_stack(stack()).unwrap();
        add_project_to(&store, 1, "web").unwrap();
        assert_eq!(store.project(1).unwrap().stack_id, "web");
    }

    #[test]
    fn test_format_project_added() {
        let output = format_project_added(&Project::new(7, "web"), &stack());
        assert!(output.contains('7'));
        assert!(output.contains("web"));
        assert!(output.contains("Web app"));
    }

    #[test]
    fn test_format_stack_added() {
        let output = format_stack_added(&stack());
        assert!(output.contains("web"));
        assert!(output.contains("nextjs"));
    }
}
