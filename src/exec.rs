//! Shell commands inside a project container.
//!
//! Execution failures never surface as errors: they come back as an
//! `Error: ...` string so callers treat every outcome as plain output.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::runtime::ContainerRuntime;
use crate::{APP_ROOT, GIT_LOG_FILE};

/// Commits recorded in the commit log.
const GIT_LOG_LIMIT: u32 = 50;

/// Short hash, subject, author name, author email, author date.
const GIT_LOG_FORMAT: &str = "%h|%s|%aN|%aE|%aD";

/// Runs shell commands in one container.
#[derive(Clone)]
pub struct CommandExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
}

impl CommandExecutor {
    /// Executor for `container_id` on `runtime`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, container_id: impl Into<String>) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
        }
    }

    /// Run `command` through `sh -c`, returning stdout followed by stderr.
    pub async fn run(&self, command: &str, workdir: Option<&str>) -> String {
        let workdir = workdir.unwrap_or(APP_ROOT);
        debug!("exec in {} ({}): {}", self.container_id, workdir, command);

        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        match self.runtime.exec(&self.container_id, &argv, workdir).await {
            Ok(output) => output.combined(),
            Err(e) => format!("Error: {e}"),
        }
    }

    /// Streaming form of [`run`](Self::run).
    ///
    /// Output is not incremental: the stream yields the full result once the
    /// command finishes.
    pub fn run_stream(&self, command: &str, workdir: Option<&str>) -> BoxStream<'static, String> {
        let executor = self.clone();
        let command = command.to_string();
        let workdir = workdir.map(str::to_string);
        stream::once(async move { executor.run(&command, workdir.as_deref()).await }).boxed()
    }

    /// Stage everything, commit, and refresh the commit log file.
    pub async fn commit(&self, message: &str) -> String {
        let output = self
            .run(
                &format!("git add -A && git commit -m {}", shell_words::quote(message)),
                None,
            )
            .await;

        let log_path = format!("{APP_ROOT}/{GIT_LOG_FILE}");
        self.run(
            &format!("git log --pretty=\"{GIT_LOG_FORMAT}\" -n {GIT_LOG_LIMIT} > {log_path}"),
            None,
        )
        .await;

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::ExecOutput;
    use crate::SandboxError;

    fn executor(runtime: &Arc<FakeRuntime>) -> CommandExecutor {
        runtime.insert("c1", true);
        CommandExecutor::new(runtime.clone(), "c1")
    }

    #[tokio::test]
    async fn test_run_concatenates_stdout_then_stderr() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.push_exec_response(Ok(ExecOutput {
            stdout: "built\n".to_string(),
            stderr: "warning: x\n".to_string(),
        }));

        let output = executor(&runtime).run("npm run build", None).await;

        assert_eq!(output, "built\nwarning: x\n");
        let (id, argv, workdir) = &runtime.execs()[0];
        assert_eq!(id, "c1");
        assert_eq!(argv, &vec!["sh", "-c", "npm run build"]);
        assert_eq!(workdir, "/app");
    }

    #[tokio::test]
    async fn test_run_uses_given_workdir() {
        let runtime = Arc::new(FakeRuntime::new());
        executor(&runtime).run("ls", Some("/app/pages")).await;
        assert_eq!(runtime.execs()[0].2, "/app/pages");
    }

    #[tokio::test]
    async fn test_run_returns_error_text_instead_of_failing() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.push_exec_response(Err(SandboxError::runtime("exec refused")));

        let output = executor(&runtime).run("true", None).await;
        assert_eq!(output, "Error: Container operation failed: exec refused");
    }

    #[tokio::test]
    async fn test_run_on_missing_container_returns_error_text() {
        let runtime = Arc::new(FakeRuntime::new());
        let output = CommandExecutor::new(runtime, "gone").run("true", None).await;
        assert!(output.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_run_stream_yields_single_result() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.push_exec_response(Ok(ExecOutput {
            stdout: "hello\n".to_string(),
            stderr: String::new(),
        }));

        let chunks: Vec<String> = executor(&runtime).run_stream("echo hello", None).collect().await;
        assert_eq!(chunks, vec!["hello\n".to_string()]);
    }

    #[tokio::test]
    async fn test_commit_quotes_message_and_writes_log() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.push_exec_response(Ok(ExecOutput {
            stdout: "[main 1a2b3c4] it's done\n".to_string(),
            stderr: String::new(),
        }));

        let output = executor(&runtime).commit("it's done").await;

        assert_eq!(output, "[main 1a2b3c4] it's done\n");
        let execs = runtime.execs();
        assert_eq!(execs.len(), 2);
        assert_eq!(
            execs[0].1[2],
            format!("git add -A && git commit -m {}", shell_words::quote("it's done"))
        );
        assert!(execs[1].1[2].ends_with("> /app/git.log"));
        assert!(execs[1].1[2].contains("-n 50"));
    }
}
