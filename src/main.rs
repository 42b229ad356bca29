//! `devbox` command-line interface.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devbox::scaffold::Template;
use devbox::ProjectId;

mod commands;

#[derive(Parser)]
#[command(name = "devbox")]
#[command(
    author,
    version,
    about = "Per-project development sandboxes backed by containers"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "DEVBOX_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage project records
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage stack records
    #[command(subcommand)]
    Stack(StackCommand),

    /// Start (or reuse) a project's sandbox
    Up {
        project_id: ProjectId,

        /// Fail instead of creating a sandbox when none is running
        #[arg(long)]
        no_create: bool,

        /// Wait until the development server answers
        #[arg(long)]
        wait: bool,
    },

    /// Show whether a project's sandbox is running and answering
    Status { project_id: ProjectId },

    /// Run a shell command inside a running sandbox
    Exec {
        project_id: ProjectId,

        /// Working directory inside the sandbox (default: /app)
        #[arg(short, long)]
        workdir: Option<String>,

        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print a project file
    Read {
        project_id: ProjectId,

        /// Sandbox path, e.g. /app/pages/index.js
        path: String,

        /// Print nothing instead of failing when the file does not exist
        #[arg(long)]
        missing_ok: bool,
    },

    /// Write a project file
    Write {
        project_id: ProjectId,

        /// Sandbox path, e.g. /app/pages/index.js
        path: String,

        /// File content (read from stdin when omitted)
        #[arg(short, long)]
        content: Option<String>,
    },

    /// List the files of a running sandbox
    Ls { project_id: ProjectId },

    /// Commit all changes inside a running sandbox
    Commit {
        project_id: ProjectId,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Stop and remove a project's container, keeping its files
    Down { project_id: ProjectId },

    /// Remove a project's container and its stored files
    Destroy { project_id: ProjectId },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Register a project or change its stack
    Add {
        project_id: ProjectId,

        /// Stack the project is built on
        #[arg(short, long)]
        stack: String,
    },
}

#[derive(Subcommand)]
enum StackCommand {
    /// Register or replace a stack
    Add {
        stack_id: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Scaffold template: nextjs or node
        #[arg(short, long, default_value = "nextjs")]
        template: Template,
    },
}

/// Install the global subscriber. The returned guard flushes the log file
/// and must live until exit.
fn init_logging(
    verbose: bool,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("devbox=debug")
    } else {
        EnvFilter::new("devbox=info")
    };

    // Logs go to stderr so command output on stdout stays clean.
    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "devbox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(file)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_format, cli.log_dir.as_deref());

    let workspace = commands::Workspace::load()?;

    match cli.command {
        Commands::Project(ProjectCommand::Add { project_id, stack }) => {
            commands::project::run_add_project(&workspace, project_id, &stack)?;
        }
        Commands::Stack(StackCommand::Add {
            stack_id,
            name,
            template,
        }) => {
            commands::project::run_add_stack(&workspace, &stack_id, &name, template)?;
        }
        Commands::Up {
            project_id,
            no_create,
            wait,
        } => {
            commands::up::run(&workspace, project_id, !no_create, wait).await?;
        }
        Commands::Status { project_id } => {
            commands::up::status(&workspace, project_id).await?;
        }
        Commands::Exec {
            project_id,
            workdir,
            command,
        } => {
            commands::exec::run(&workspace, project_id, workdir.as_deref(), &command).await?;
        }
        Commands::Read {
            project_id,
            path,
            missing_ok,
        } => {
            commands::files::read(&workspace, project_id, &path, missing_ok).await?;
        }
        Commands::Write {
            project_id,
            path,
            content,
        } => {
            commands::files::write(&workspace, project_id, &path, content).await?;
        }
        Commands::Ls { project_id } => {
            commands::files::list(&workspace, project_id).await?;
        }
        Commands::Commit {
            project_id,
            message,
        } => {
            commands::exec::commit(&workspace, project_id, &message).await?;
        }
        Commands::Down { project_id } => {
            commands::down::run(&workspace, project_id).await?;
        }
        Commands::Destroy { project_id } => {
            commands::down::destroy(&workspace, project_id).await?;
        }
    }

    Ok(())
}
