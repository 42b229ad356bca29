//! Bring a project's sandbox up and report on it.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write;
use tracing::info;

use devbox::{ProjectId, APP_ROOT};

use super::Workspace;

/// Observed state of a project's sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxStatus {
    /// No running container.
    Stopped,
    /// Container running, service not answering yet.
    Starting,
    /// Service answering.
    Up,
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Up => write!(f, "up"),
        }
    }
}

/// Status from a probe result, `None` when no container is running.
pub fn classify(probe: Option<bool>) -> SandboxStatus {
    match probe {
        Some(true) => SandboxStatus::Up,
        Some(false) => SandboxStatus::Starting,
        None => SandboxStatus::Stopped,
    }
}

/// Format a status report.
pub fn format_status(project_id: ProjectId, status: SandboxStatus, port: u16) -> String {
    let mut out = String::new();
    let label = match status {
        SandboxStatus::Up => status.to_string().green().bold(),
        SandboxStatus::Starting => status.to_string().yellow(),
        SandboxStatus::Stopped => status.to_string().red(),
    };

    writeln!(&mut out, "  Project:  {}", project_id.to_string().cyan()).unwrap();
    writeln!(&mut out, "  Status:   {}", label).unwrap();
    if status != SandboxStatus::Stopped {
        writeln!(
            &mut out,
            "  Service:  {}",
            format!("http://localhost:{port}").cyan()
        )
        .unwrap();
        writeln!(&mut out, "  Files:    {}", APP_ROOT.dimmed()).unwrap();
    } else {
        writeln!(
            &mut out,
            "  Run {} to start it.",
            format!("devbox up {project_id}").green()
        )
        .unwrap();
    }
    out
}

/// Format the result of `up`.
pub fn format_up(project_id: ProjectId, ready: bool) -> String {
    let mut out = String::new();
    if ready {
        writeln!(
            &mut out,
            "{} Sandbox for project {} is up",
            "✓".green(),
            project_id.to_string().cyan()
        )
        .unwrap();
    } else {
        writeln!(
            &mut out,
            "{} Sandbox for project {} is running; the service may still be starting",
            "✓".green(),
            project_id.to_string().cyan()
        )
        .unwrap();
    }
    out
}

/// Entry point for `up`.
pub async fn run(
    workspace: &Workspace,
    project_id: ProjectId,
    create: bool,
    wait: bool,
) -> Result<()> {
    let backend = workspace.backend().await?;
    info!("Starting sandbox for project {}", project_id);

    let mut sandbox = backend
        .get_or_create(project_id, create)
        .await
        .with_context(|| format!("Failed to start sandbox for project {project_id}"))?;

    if wait {
        println!(
            "{} Waiting for the service on port {}...",
            "⏳".yellow(),
            workspace.config().sandbox.host_port
        );
        sandbox.wait_until_up().await?;
    }

    print!("{}", format_up(project_id, sandbox.is_ready()));
    Ok(())
}

/// Entry point for `status`.
pub async fn status(workspace: &Workspace, project_id: ProjectId) -> Result<()> {
    workspace.project(project_id)?;
    let backend = workspace.backend().await?;

    let answering = match backend.get_or_create(project_id, false).await {
        Ok(sandbox) => Some(sandbox.is_up().await),
        Err(e) if e.is_not_ready() => None,
        Err(e) => return Err(e.into()),
    };

    print!(
        "{}",
        format_status(project_id, classify(answering), workspace.config().sandbox.host_port)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some(true)), SandboxStatus::Up);
        assert_eq!(classify(Some(false)), SandboxStatus::Starting);
        assert_eq!(classify(None), SandboxStatus::Stopped);
    }

    #[test]
    fn test_format_status_up() {
        let output = format_status(3, SandboxStatus::Up, 3000);
        assert!(output.contains("up"));
        assert!(output.contains("http://localhost:3000"));
    }

    #[test]
    fn test_format_status_stopped_suggests_up() {
        let output = format_status(3, SandboxStatus::Stopped, 3000);
        assert!(output.contains("stopped"));
        assert!(output.contains("devbox up 3"));
        assert!(!output.contains("localhost"));
    }

    #[test]
    fn test_format_up() {
        assert!(format_up(1, true).contains("is up"));
        assert!(format_up(1, false).contains("may still be starting"));
    }
}
