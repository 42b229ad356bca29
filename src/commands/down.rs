//! Tear down a project's sandbox.

use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;
use tracing::info;

use devbox::store::Project;
use devbox::ProjectId;

use super::Workspace;

/// Format the result of `down` or `destroy`.
pub fn format_teardown(project: &Project, removed_storage: bool) -> String {
    let mut out = String::new();
    writeln!(
        &mut out,
        "{} Stopped sandbox for project {}",
        "✓".green(),
        project.id.to_string().cyan()
    )
    .unwrap();
    if removed_storage {
        if let Some(dir) = &project.local_project_dir {
            writeln!(
                &mut out,
                "  {} {}",
                "✗".red(),
                dir.display().to_string().dimmed()
            )
            .unwrap();
        }
    }
    out
}

/// Entry point for `down`: stop and remove the container, keep the files.
pub async fn run(workspace: &Workspace, project_id: ProjectId) -> Result<()> {
    let project = workspace.project(project_id)?;
    let backend = workspace.backend().await?;

    backend.destroy(&project).await;
    info!("Sandbox for project {} is down", project_id);

    print!("{}", format_teardown(&project, false));
    Ok(())
}

/// Entry point for `destroy`: container and stored files.
pub async fn destroy(workspace: &Workspace, project_id: ProjectId) -> Result<()> {
    let project = workspace.project(project_id)?;
    let backend = workspace.backend().await?;

    backend.destroy_all(&project).await;
    info!("Sandbox and storage for project {} removed", project_id);

    print!("{}", format_teardown(&project, true));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_teardown_keeps_storage() {
        let mut project = Project::new(5, "web");
        project.local_project_dir = Some(PathBuf::from("/tmp/devbox_projects/project_5"));

        let output = format_teardown(&project, false);
        assert!(output.contains("Stopped sandbox for project"));
        assert!(!output.contains("project_5"));
    }

    #[test]
    fn test_format_teardown_lists_removed_storage() {
        let mut project = Project::new(5, "web");
        project.local_project_dir = Some(PathBuf::from("/tmp/devbox_projects/project_5"));

        let output = format_teardown(&project, true);
        assert!(output.contains("/tmp/devbox_projects/project_5"));
    }
}
