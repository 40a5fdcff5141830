//! Local checkout management for the repositories the agent works in.
//!
//! One checkout per repository under the workspace root. New items get
//! a fetch + hard reset to the default branch; continuations leave the
//! tree exactly as the previous attempt left it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::external::{CommandError, CommandExecutor};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid repository name: {name}")]
    InvalidRepository { name: String },
    #[error("failed to clone {repo}: {message}")]
    CloneFailed { repo: String, message: String },
    #[error("failed to reset {repo} to origin/{branch}: {message}")]
    ResetFailed {
        repo: String,
        branch: String,
        message: String,
    },
    #[error("workspace IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("workspace operation cancelled")]
    Cancelled,
    #[error("git invocation failed: {0}")]
    Command(CommandError),
}

impl From<CommandError> for WorkspaceError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Cancelled => WorkspaceError::Cancelled,
            other => WorkspaceError::Command(other),
        }
    }
}

/// Trait for preparing the working tree handed to the agent.
#[async_trait]
pub trait WorkspaceOps: Send + Sync {
    /// Idempotently make sure a checkout exists for `repo`.
    async fn ensure_repository(&self, repo: &str) -> Result<(), WorkspaceError>;

    /// Fetch origin and hard-reset the checkout to `origin/<branch>`.
    /// Only called when starting a new item, never on continuation.
    async fn switch_to_main(&self, repo: &str, branch: &str) -> Result<(), WorkspaceError>;

    /// Absolute working path for `repo`'s checkout.
    fn working_directory(&self, repo: &str) -> PathBuf;
}

/// Checkouts under `<root>/<owner>/<name>`, managed with the git CLI.
pub struct LocalWorkspace {
    root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>, executor: Arc<dyn CommandExecutor>) -> std::io::Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root, executor })
    }

    fn validate(repo: &str) -> Result<(), WorkspaceError> {
        let mut parts = repo.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None)
                if !owner.is_empty() && !name.is_empty() && owner != ".." && name != ".." =>
            {
                Ok(())
            }
            _ => Err(WorkspaceError::InvalidRepository {
                name: repo.to_string(),
            }),
        }
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<crate::external::CommandOutput, WorkspaceError> {
        Ok(self.executor.execute("git", args, Some(cwd)).await?)
    }
}

#[async_trait]
impl WorkspaceOps for LocalWorkspace {
    async fn ensure_repository(&self, repo: &str) -> Result<(), WorkspaceError> {
        Self::validate(repo)?;
        let checkout = self.working_directory(repo);

        if checkout.join(".git").exists() {
            debug!(repo, path = ?checkout, "Checkout already present");
            return Ok(());
        }

        if let Some(parent) = checkout.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("https://github.com/{repo}.git");
        info!(repo, path = ?checkout, "Cloning repository");
        let output = self
            .executor
            .execute(
                "git",
                &["clone", &url, &checkout.to_string_lossy()],
                None,
            )
            .await?;
        if !output.success() {
            return Err(WorkspaceError::CloneFailed {
                repo: repo.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    async fn switch_to_main(&self, repo: &str, branch: &str) -> Result<(), WorkspaceError> {
        Self::validate(repo)?;
        let checkout = self.working_directory(repo);

        let fetched = self.git(&["fetch", "origin"], &checkout).await?;
        if !fetched.success() {
            return Err(WorkspaceError::ResetFailed {
                repo: repo.to_string(),
                branch: branch.to_string(),
                message: fetched.stderr.trim().to_string(),
            });
        }

        let target = format!("origin/{branch}");
        let reset = self.git(&["reset", "--hard", &target], &checkout).await?;
        if !reset.success() {
            return Err(WorkspaceError::ResetFailed {
                repo: repo.to_string(),
                branch: branch.to_string(),
                message: reset.stderr.trim().to_string(),
            });
        }

        // Leftover untracked files from an abandoned item would leak
        // into the next one.
        let cleaned = self.git(&["clean", "-fd"], &checkout).await?;
        if !cleaned.success() {
            return Err(WorkspaceError::ResetFailed {
                repo: repo.to_string(),
                branch: branch.to_string(),
                message: cleaned.stderr.trim().to_string(),
            });
        }

        info!(repo, branch, "Reset checkout to origin branch");
        Ok(())
    }

    fn working_directory(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CommandOutput;
    use std::sync::Mutex;

    /// Records git invocations and replies success to everything
    /// unless a failure is scripted for a subcommand.
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(subcommand: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(subcommand),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(
            &self,
            program: &str,
            args: &[&str],
            _cwd: Option<&Path>,
        ) -> Result<CommandOutput, CommandError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, args.join(" ")));

            let failed = self.fail_on.map(|s| args.first() == Some(&s)).unwrap_or(false);
            Ok(CommandOutput {
                status_code: if failed { 128 } else { 0 },
                stdout: String::new(),
                stderr: if failed { "fatal: scripted failure".to_string() } else { String::new() },
            })
        }
    }

    fn workspace(root: &Path, executor: Arc<RecordingExecutor>) -> LocalWorkspace {
        LocalWorkspace::new(root.to_path_buf(), executor).unwrap()
    }

    #[tokio::test]
    async fn ensure_clones_when_checkout_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ws = workspace(dir.path(), executor.clone());

        ws.ensure_repository("acme/api").await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("git clone https://github.com/acme/api.git"));
    }

    #[tokio::test]
    async fn ensure_is_idempotent_once_cloned() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("acme/api/.git")).unwrap();

        let executor = Arc::new(RecordingExecutor::new());
        let ws = workspace(dir.path(), executor.clone());

        ws.ensure_repository("acme/api").await.unwrap();
        ws.ensure_repository("acme/api").await.unwrap();

        assert!(executor.calls().is_empty(), "no git calls for existing checkout");
    }

    #[tokio::test]
    async fn switch_fetches_resets_and_cleans() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ws = workspace(dir.path(), executor.clone());

        ws.switch_to_main("acme/api", "main").await.unwrap();

        assert_eq!(
            executor.calls(),
            vec![
                "git fetch origin".to_string(),
                "git reset --hard origin/main".to_string(),
                "git clean -fd".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_clone_maps_to_clone_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::failing_on("clone"));
        let ws = workspace(dir.path(), executor);

        let err = ws.ensure_repository("acme/api").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::CloneFailed { .. }));
    }

    #[tokio::test]
    async fn failed_reset_maps_to_reset_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::failing_on("reset"));
        let ws = workspace(dir.path(), executor);

        let err = ws.switch_to_main("acme/api", "main").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::ResetFailed { .. }));
    }

    #[tokio::test]
    async fn rejects_malformed_repository_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ws = workspace(dir.path(), executor);

        for bad in ["acme", "acme/api/extra", "/api", "acme/", "../x"] {
            assert!(
                matches!(
                    ws.ensure_repository(bad).await,
                    Err(WorkspaceError::InvalidRepository { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn working_directory_is_rooted_and_absolute() {
        let dir = tempfile::TempDir::new().unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let ws = workspace(dir.path(), executor);

        let path = ws.working_directory("acme/api");
        assert!(path.is_absolute());
        assert!(path.ends_with("acme/api"));
    }
}
