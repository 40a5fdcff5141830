//! Runner for an arbitrary operator-configured agent command.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{spawn_error, wait_with_cancellation, AgentError, AgentRequest, AgentRunner};
use crate::shutdown::ShutdownSignal;

/// Environment variable set to `1` when the invocation continues a
/// previous attempt instead of starting fresh.
pub const CONTINUE_ENV: &str = "NIGHT_SHIFT_CONTINUE";

/// Runs the configured command with the prompt delivered on stdin.
pub struct ShellAgentRunner {
    command: String,
    args: Vec<String>,
    shutdown: ShutdownSignal,
}

impl ShellAgentRunner {
    pub fn new(command: String, args: Vec<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            command,
            args,
            shutdown,
        }
    }
}

#[async_trait]
impl AgentRunner for ShellAgentRunner {
    async fn run(&self, request: &AgentRequest) -> Result<(), AgentError> {
        if request.dry_run {
            info!(
                command = %self.command,
                workdir = ?request.working_directory,
                continue_session = request.continue_session,
                "Dry run, skipping agent invocation"
            );
            return Ok(());
        }

        debug!(
            command = %self.command,
            workdir = ?request.working_directory,
            continue_session = request.continue_session,
            "Starting agent"
        );

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&request.working_directory)
            .stdin(std::process::Stdio::piped())
            .kill_on_drop(true);
        if request.continue_session {
            cmd.env(CONTINUE_ENV, "1");
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(&self.command, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| AgentError::Io {
                    message: e.to_string(),
                })?;
            stdin.shutdown().await.map_err(|e| AgentError::Io {
                message: e.to_string(),
            })?;
        }

        wait_with_cancellation(child, &self.shutdown).await
    }
}
