//! Read, write and list project files.
//!
//! `read` and `write` go through stored project files and work without a
//! running sandbox. `ls` lists the tree of a running sandbox.

use anyhow::{bail, Context, Result};
use std::fmt::Write;
use std::io::Read;

use devbox::ProjectId;

use super::Workspace;

/// Format a path listing, one path per line.
pub fn format_listing(paths: &[String]) -> String {
    let mut out = String::new();
    for path in paths {
        writeln!(&mut out, "{path}").unwrap();
    }
    out
}

/// Entry point for `read`.
pub async fn read(
    workspace: &Workspace,
    project_id: ProjectId,
    path: &str,
    missing_ok: bool,
) -> Result<()> {
    let project = workspace.project(project_id)?;
    let backend = workspace.offline_backend()?;

    match backend.read_project_file(&project, path).await? {
        Some(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
        None if missing_ok => {}
        None => bail!("File not found: {path}"),
    }
    Ok(())
}

/// Entry point for `write`; reads content from stdin when none is given.
pub async fn write(
    workspace: &Workspace,
    project_id: ProjectId,
    path: &str,
    content: Option<String>,
) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read content from stdin")?;
            buf
        }
    };

    let project = workspace.project(project_id)?;
    let backend = workspace.offline_backend()?;
    backend
        .write_project_file(&project, path, &content)
        .await
        .with_context(|| format!("Failed to write {path}"))?;
    Ok(())
}

/// Entry point for `ls`.
pub async fn list(workspace: &Workspace, project_id: ProjectId) -> Result<()> {
    let backend = workspace.backend().await?;
    let sandbox = backend
        .get_or_create(project_id, false)
        .await
        .with_context(|| format!("No running sandbox for project {project_id}"))?;

    print!("{}", format_listing(&sandbox.list_paths().await?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_listing() {
        let paths = vec!["/app/a.js".to_string(), "/app/pages/index.js".to_string()];
        assert_eq!(format_listing(&paths), "/app/a.js\n/app/pages/index.js\n");
    }

    #[test]
    fn test_format_listing_empty() {
        assert_eq!(format_listing(&[]), "");
    }
}
