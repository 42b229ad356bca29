//! Initial file tree for freshly allocated project storage.
//!
//! The scaffold is picked from the stack's template, written to the project
//! directory and committed as the first revision. A failed git step is
//! logged and ignored.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::store::Stack;
use crate::{templates, ProjectId, Result, SandboxError};

const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Scaffold templates a stack can name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Template {
    /// Next.js pages app.
    #[default]
    NextJs,
    /// Bare Node HTTP server.
    Node,
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NextJs => write!(f, "nextjs"),
            Self::Node => write!(f, "node"),
        }
    }
}

impl std::str::FromStr for Template {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nextjs" | "next" | "next.js" => Ok(Self::NextJs),
            "node" | "nodejs" => Ok(Self::Node),
            _ => anyhow::bail!("Unknown template: '{s}'. Supported: nextjs, node"),
        }
    }
}

impl Template {
    /// Template for a stack, falling back to the default for unknown names.
    pub fn for_stack(stack: &Stack) -> Self {
        stack.template.parse().unwrap_or_else(|e| {
            warn!("{} (stack '{}'), using {}", e, stack.id, Self::default());
            Self::default()
        })
    }
}

/// File written during initialization, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldFile {
    /// Relative path.
    pub path: PathBuf,
    /// Rendered content.
    pub content: String,
}

/// Files making up the scaffold for `template`.
pub fn scaffold_files(template: Template, project_id: ProjectId) -> Result<Vec<ScaffoldFile>> {
    let (package_json, entry_path, entry) = match template {
        Template::NextJs => (
            templates::NEXTJS_PACKAGE_JSON,
            "pages/index.js",
            templates::NEXTJS_INDEX,
        ),
        Template::Node => (templates::NODE_PACKAGE_JSON, "index.js", templates::NODE_INDEX),
    };

    Ok(vec![
        ScaffoldFile {
            path: PathBuf::from("package.json"),
            content: render_manifest(package_json, project_id)?,
        },
        ScaffoldFile {
            path: PathBuf::from(entry_path),
            content: entry.to_string(),
        },
        ScaffoldFile {
            path: PathBuf::from(".gitignore"),
            content: templates::GITIGNORE.to_string(),
        },
    ])
}

/// Stamp the project name into a template manifest.
fn render_manifest(template: &str, project_id: ProjectId) -> Result<String> {
    let mut manifest: serde_json::Value = serde_json::from_str(template)
        .map_err(|e| SandboxError::config(format!("Invalid package.json template: {e}")))?;

    if let Some(obj) = manifest.as_object_mut() {
        obj.insert(
            "name".to_string(),
            serde_json::Value::String(format!("devbox-project-{project_id}")),
        );
    }

    let mut rendered = serde_json::to_string_pretty(&manifest)
        .map_err(|e| SandboxError::config(format!("Failed to render package.json: {e}")))?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write the stack's scaffold into `project_dir` and commit it.
pub async fn initialize_project(
    project_dir: &Path,
    stack: &Stack,
    project_id: ProjectId,
) -> Result<()> {
    let template = Template::for_stack(stack);
    info!(
        "Initializing project {} from {} template",
        project_id, template
    );

    for file in scaffold_files(template, project_id)? {
        let path = project_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::io(parent, e))?;
        }
        tokio::fs::write(&path, &file.content)
            .await
            .map_err(|e| SandboxError::io(&path, e))?;
    }

    // Dev servers expect a public/ directory even when empty.
    let public = project_dir.join("public");
    tokio::fs::create_dir_all(&public)
        .await
        .map_err(|e| SandboxError::io(&public, e))?;

    if let Err(e) = init_git(project_dir).await {
        warn!("Could not initialize git repository: {:#}", e);
    }

    Ok(())
}

/// `git init`, stage everything, commit.
async fn init_git(project_dir: &Path) -> anyhow::Result<()> {
    git(project_dir, &["init"]).await?;
    git(project_dir, &["add", "."]).await?;
    git(
        project_dir,
        &[
            "-c",
            "user.name=devbox",
            "-c",
            "user.email=devbox@localhost",
            "commit",
            "-m",
            INITIAL_COMMIT_MESSAGE,
        ],
    )
    .await
}

async fn git(cwd: &Path, args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}
