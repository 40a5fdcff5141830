//! The octocrab-backed gateway: who is the user, what work is pending
//! for them, and what is a repository's default branch.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::github::errors::GitHubError;
use crate::github::filter::RepoFilter;
use crate::shutdown::ShutdownSignal;
use crate::workitem::{ItemDetails, ItemKind, PendingSnapshot, WorkItem};

const SEARCH_PAGE_SIZE: u8 = 50;

/// Gateway operations the monitor loop consumes. Kept as a trait so the
/// loop is testable without the network.
#[async_trait]
pub trait GitHubOps: Send + Sync {
    async fn authenticated_user(&self) -> Result<String, GitHubError>;

    /// All pending work for `username`, filtered to the configured
    /// repositories. Ordering within each sequence is unspecified; the
    /// prioritizer re-sorts everything.
    async fn pending_items(&self, username: &str) -> Result<PendingSnapshot, GitHubError>;

    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError>;
}

pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    filter: RepoFilter,
    shutdown: ShutdownSignal,
}

impl GitHubClient {
    pub fn new(
        token: String,
        filter: RepoFilter,
        shutdown: ShutdownSignal,
    ) -> Result<Self, GitHubError> {
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(GitHubError::from_octocrab)?;
        Ok(Self {
            octocrab,
            filter,
            shutdown,
        })
    }

    /// Race an octocrab call against the shutdown signal so a tick never
    /// outlives a cancellation request by more than the current await.
    async fn guarded<T>(
        &self,
        fut: impl std::future::Future<Output = octocrab::Result<T>>,
    ) -> Result<T, GitHubError> {
        tokio::select! {
            result = fut => result.map_err(GitHubError::from_octocrab),
            _ = self.shutdown.cancelled() => Err(GitHubError::Cancelled),
        }
    }

    async fn search_kind(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Vec<WorkItem>, GitHubError> {
        let page = self
            .guarded(
                self.octocrab
                    .search()
                    .issues_and_pull_requests(query)
                    .per_page(SEARCH_PAGE_SIZE)
                    .send(),
            )
            .await?;

        let items: Vec<WorkItem> = page
            .items
            .into_iter()
            .filter_map(|issue| map_issue(kind, issue))
            .filter(|item| self.filter.matches(&item.repository))
            .collect();
        debug!(kind = %kind, count = items.len(), "Fetched search results");
        Ok(items)
    }

    async fn notification_kinds(&self, snapshot: &mut PendingSnapshot) -> Result<(), GitHubError> {
        let page = self
            .guarded(
                self.octocrab
                    .activity()
                    .notifications()
                    .list()
                    .per_page(SEARCH_PAGE_SIZE)
                    .send(),
            )
            .await?;

        for notification in page.items {
            match map_notification(notification) {
                Some(item) if self.filter.matches(&item.repository) => snapshot.push(item),
                Some(_) => {}
                None => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GitHubOps for GitHubClient {
    async fn authenticated_user(&self) -> Result<String, GitHubError> {
        let user = self.guarded(self.octocrab.current().user()).await?;
        Ok(user.login)
    }

    async fn pending_items(&self, username: &str) -> Result<PendingSnapshot, GitHubError> {
        let mut snapshot = PendingSnapshot::default();

        for (kind, query) in search_queries(username) {
            for item in self.search_kind(kind, &query).await? {
                snapshot.push(item);
            }
        }
        self.notification_kinds(&mut snapshot).await?;

        debug!(count = snapshot.count(), "Assembled pending snapshot");
        Ok(snapshot)
    }

    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let (owner, name) = match repo.split_once('/') {
            Some(parts) => parts,
            None => return Ok("main".to_string()),
        };
        let repository = self.guarded(self.octocrab.repos(owner, name).get()).await?;
        Ok(repository
            .default_branch
            .unwrap_or_else(|| "main".to_string()))
    }
}

/// The four searched kinds and their queries. The remaining kinds come
/// from the notifications feed.
fn search_queries(username: &str) -> [(ItemKind, String); 4] {
    [
        (
            ItemKind::ReviewRequest,
            format!("is:open is:pr review-requested:{username} archived:false"),
        ),
        (
            ItemKind::AssignedPr,
            format!("is:open is:pr assignee:{username} archived:false"),
        ),
        (
            ItemKind::PrWithChanges,
            format!("is:open is:pr author:{username} review:changes_requested archived:false"),
        ),
        (
            ItemKind::AssignedIssue,
            format!("is:open is:issue assignee:{username} archived:false"),
        ),
    ]
}

/// Notification reasons that map onto dedicated kinds; everything else
/// is surfaced as a plain notification.
fn kind_for_reason(reason: &str) -> ItemKind {
    match reason {
        "mention" => ItemKind::Mention,
        "comment" => ItemKind::UnreadComment,
        "ci_activity" => ItemKind::FailedWorkflow,
        _ => ItemKind::Notification,
    }
}

/// `https://api.github.com/repos/{owner}/{repo}` → `owner/repo`.
fn repo_from_api_url(url: &url::Url) -> Option<String> {
    let mut segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let name = segments.pop()?;
    let owner = segments.pop()?;
    Some(format!("{owner}/{name}"))
}

/// Trailing number of a subject API URL like
/// `https://api.github.com/repos/acme/api/issues/123`; 0 when absent.
fn number_from_api_url(url: Option<&url::Url>) -> u64 {
    url.and_then(|u| u.path_segments())
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .and_then(|last| last.parse().ok())
        .unwrap_or(0)
}

/// Browser URL for a notification subject. Thread subjects that are not
/// issues or PRs fall back to the repository page.
fn subject_html_url(repo: &str, subject_type: &str, number: u64) -> String {
    match (subject_type, number) {
        ("PullRequest", n) if n > 0 => format!("https://github.com/{repo}/pull/{n}"),
        ("Issue", n) if n > 0 => format!("https://github.com/{repo}/issues/{n}"),
        _ => format!("https://github.com/{repo}"),
    }
}

fn map_issue(kind: ItemKind, issue: octocrab::models::issues::Issue) -> Option<WorkItem> {
    let repository = repo_from_api_url(&issue.repository_url)?;
    let labels: Vec<String> = issue.labels.iter().map(|l| l.name.clone()).collect();
    let details = match kind {
        ItemKind::ReviewRequest => ItemDetails::ReviewRequest { labels },
        ItemKind::AssignedPr => ItemDetails::AssignedPr { labels },
        ItemKind::PrWithChanges => ItemDetails::PrWithChanges { labels },
        ItemKind::AssignedIssue => ItemDetails::AssignedIssue { labels },
        _ => ItemDetails::Empty,
    };

    Some(WorkItem {
        kind,
        number: issue.number,
        repository,
        title: issue.title,
        url: issue.html_url.to_string(),
        author: issue.user.login,
        updated_at: issue.updated_at,
        details,
    })
}

fn map_notification(notification: octocrab::models::activity::Notification) -> Option<WorkItem> {
    let repository = match notification.repository.full_name {
        Some(full_name) => full_name,
        None => {
            warn!(id = %notification.id, "Notification without repository, skipping");
            return None;
        }
    };

    let kind = kind_for_reason(&notification.reason);
    let subject_type = notification.subject.r#type.clone();
    let number = number_from_api_url(notification.subject.url.as_ref());
    let url = subject_html_url(&repository, &subject_type, number);

    let details = match kind {
        ItemKind::Mention => ItemDetails::Mention {
            subject_type,
            thread_url: notification
                .subject
                .latest_comment_url
                .map(|u| u.to_string())
                .unwrap_or_default(),
        },
        ItemKind::UnreadComment => ItemDetails::UnreadComment {
            subject_type,
            latest_comment_url: notification
                .subject
                .latest_comment_url
                .map(|u| u.to_string())
                .unwrap_or_default(),
        },
        ItemKind::FailedWorkflow => ItemDetails::FailedWorkflow { subject_type },
        _ => ItemDetails::Notification {
            reason: notification.reason.clone(),
            subject_type,
        },
    };

    Some(WorkItem {
        kind,
        number,
        repository,
        title: notification.subject.title,
        url,
        author: String::new(),
        updated_at: notification.updated_at,
        details,
    })
}
