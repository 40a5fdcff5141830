use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub authentication failed: {0}")]
    Auth(String),
    #[error("GitHub rate limit exceeded")]
    RateLimit,
    #[error("GitHub API error: {0}")]
    Api(octocrab::Error),
    #[error("gateway call cancelled")]
    Cancelled,
}

impl GitHubError {
    /// Fold an octocrab error into the taxonomy the monitor loop acts
    /// on: credential failures are fatal at startup, transient errors
    /// just skip the tick.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => match source.status_code.as_u16() {
                401 => GitHubError::Auth(source.message.clone()),
                403 | 429 if source.message.to_lowercase().contains("rate limit") => {
                    GitHubError::RateLimit
                }
                403 => GitHubError::Auth(source.message.clone()),
                _ => GitHubError::Api(err),
            },
            _ => GitHubError::Api(err),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GitHubError::Auth(_))
    }

    /// Transient failures are retried implicitly by the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::RateLimit => true,
            GitHubError::Api(octocrab::Error::GitHub { source, .. }) => {
                source.status_code.is_server_error()
            }
            // Transport and decoding failures: nothing actionable in
            // this tick, the next one retries.
            GitHubError::Api(_) => true,
            GitHubError::Auth(_) | GitHubError::Cancelled => false,
        }
    }
}
