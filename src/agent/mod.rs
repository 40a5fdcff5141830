//! The external AI agent that actually works an item. The monitor only
//! depends on [`AgentRunner`]; concrete runners are chosen by
//! configuration through [`from_config`].

pub mod claude;
pub mod shell;

pub use claude::ClaudeAgentRunner;
pub use shell::ShellAgentRunner;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AgentSettings;
use crate::shutdown::ShutdownSignal;

/// One agent invocation: the instruction text plus how and where to run.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub working_directory: PathBuf,
    /// Pick up where the previous attempt left off rather than starting
    /// a fresh session.
    pub continue_session: bool,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent command not found: {command}")]
    NotFound { command: String },
    #[error("agent exited with status {code}")]
    NonZeroExit { code: i32 },
    #[error("agent terminated by signal")]
    Terminated,
    #[error("agent invocation cancelled")]
    Cancelled,
    #[error("failed to run agent: {message}")]
    Io { message: String },
}

/// Blocking invocation of the agent process. Implementations must honor
/// cancellation: when shutdown fires, the child is killed and `run`
/// returns [`AgentError::Cancelled`] promptly.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> Result<(), AgentError>;
}

#[derive(Debug, Error)]
#[error("unknown agent kind '{kind}', expected \"claude\" or \"shell\"")]
pub struct UnknownAgentKind {
    pub kind: String,
}

/// Build the configured runner.
pub fn from_config(
    settings: &AgentSettings,
    shutdown: ShutdownSignal,
) -> Result<Arc<dyn AgentRunner>, UnknownAgentKind> {
    match settings.kind.as_str() {
        "claude" => Ok(Arc::new(ClaudeAgentRunner::new(
            settings.command.clone(),
            settings.args.clone(),
            shutdown,
        ))),
        "shell" => Ok(Arc::new(ShellAgentRunner::new(
            settings.command.clone(),
            settings.args.clone(),
            shutdown,
        ))),
        other => Err(UnknownAgentKind {
            kind: other.to_string(),
        }),
    }
}

/// Shared wait-or-cancel handling for runner children.
pub(crate) async fn wait_with_cancellation(
    mut child: tokio::process::Child,
    shutdown: &ShutdownSignal,
) -> Result<(), AgentError> {
    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| AgentError::Io { message: e.to_string() })?;
            if status.success() {
                Ok(())
            } else {
                match status.code() {
                    Some(code) => Err(AgentError::NonZeroExit { code }),
                    None => Err(AgentError::Terminated),
                }
            }
        }
        _ = shutdown.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(AgentError::Cancelled)
        }
    }
}

pub(crate) fn spawn_error(command: &str, err: std::io::Error) -> AgentError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AgentError::NotFound {
            command: command.to_string(),
        }
    } else {
        AgentError::Io {
            message: err.to_string(),
        }
    }
}
