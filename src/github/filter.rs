//! Include/exclude filtering of repositories by `owner/name` pattern.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid repository pattern '{pattern}': {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    source: regex::Error,
}

/// Wildcard patterns over full repository names. `*` matches any run of
/// characters, so `acme/*` scopes to an owner and `*` alone matches
/// everything. Matching is case-insensitive; exclude wins over include;
/// an empty include list admits every repository.
#[derive(Debug, Clone, Default)]
pub struct RepoFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RepoFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn matches(&self, repo: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(repo)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(repo))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, PatternError> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn compile(pattern: &str) -> Result<Regex, PatternError> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("(?i)^{escaped}$")).map_err(|source| PatternError {
        pattern: pattern.to_string(),
        source,
    })
}
