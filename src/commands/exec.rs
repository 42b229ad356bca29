//! Run commands and record commits inside a running sandbox.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fmt::Write;

use devbox::ProjectId;

use super::Workspace;

/// Join argv into the single shell line the sandbox runs.
pub fn shell_line(argv: &[String]) -> Result<String> {
    match argv {
        [] => bail!("No command given"),
        // A lone argument is taken as a complete shell line.
        [line] => Ok(line.clone()),
        _ => Ok(shell_words::join(argv)),
    }
}

/// Format the output of `commit`.
pub fn format_commit(project_id: ProjectId, output: &str) -> String {
    let mut out = String::new();
    let output = output.trim_end();
    if output.starts_with("Error: ") || output.contains("nothing to commit") {
        writeln!(
            &mut out,
            "{} Nothing committed for project {}",
            "ℹ".blue(),
            project_id.to_string().cyan()
        )
        .unwrap();
    } else {
        writeln!(
            &mut out,
            "{} Committed changes in project {}",
            "✓".green(),
            project_id.to_string().cyan()
        )
        .unwrap();
    }
    if !output.is_empty() {
        for line in output.lines() {
            writeln!(&mut out, "  {}", line.dimmed()).unwrap();
        }
    }
    out
}

/// Entry point for `exec`.
pub async fn run(
    workspace: &Workspace,
    project_id: ProjectId,
    workdir: Option<&str>,
    argv: &[String],
) -> Result<()> {
    let line = shell_line(argv)?;
    let backend = workspace.backend().await?;
    let sandbox = backend
        .get_or_create(project_id, false)
        .await
        .with_context(|| format!("No running sandbox for project {project_id}"))?;

    print!("{}", sandbox.run_command(&line, workdir).await);
    Ok(())
}

/// Entry point for `commit`.
pub async fn commit(workspace: &Workspace, project_id: ProjectId, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Commit message must not be empty");
    }

    let backend = workspace.backend().await?;
    let sandbox = backend
        .get_or_create(project_id, false)
        .await
        .with_context(|| format!("No running sandbox for project {project_id}"))?;

    let output = sandbox.commit_changes(message).await;
    print!("{}", format_commit(project_id, &output));
    Ok(())
}
