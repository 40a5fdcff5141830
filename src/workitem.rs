//! Work item model shared by the gateway, prioritizer, state store and
//! prompt builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The eight kinds of pending work the monitor acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    ReviewRequest,
    AssignedPr,
    PrWithChanges,
    AssignedIssue,
    Mention,
    UnreadComment,
    Notification,
    FailedWorkflow,
}

pub const ALL_KINDS: [ItemKind; 8] = [
    ItemKind::ReviewRequest,
    ItemKind::AssignedPr,
    ItemKind::PrWithChanges,
    ItemKind::AssignedIssue,
    ItemKind::Mention,
    ItemKind::UnreadComment,
    ItemKind::Notification,
    ItemKind::FailedWorkflow,
];

impl ItemKind {
    /// Stable string tag. Used in item keys and the state file, so the
    /// values here must never change.
    pub fn tag(&self) -> &'static str {
        match self {
            ItemKind::ReviewRequest => "review_request",
            ItemKind::AssignedPr => "assigned_pr",
            ItemKind::PrWithChanges => "pr_with_changes",
            ItemKind::AssignedIssue => "assigned_issue",
            ItemKind::Mention => "mention",
            ItemKind::UnreadComment => "unread_comment",
            ItemKind::Notification => "notification",
            ItemKind::FailedWorkflow => "failed_workflow",
        }
    }

    /// One-shot kinds come from the notifications feed and carry no
    /// stable upstream state to poll: present means still pending,
    /// absent means resolved. The other four kinds are re-polled and
    /// can additionally report content changes.
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            ItemKind::Mention
                | ItemKind::UnreadComment
                | ItemKind::Notification
                | ItemKind::FailedWorkflow
        )
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Kind-specific payload consumed by the prompt builder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ItemDetails {
    #[default]
    Empty,
    ReviewRequest {
        #[serde(default)]
        labels: Vec<String>,
    },
    AssignedPr {
        #[serde(default)]
        labels: Vec<String>,
    },
    PrWithChanges {
        #[serde(default)]
        labels: Vec<String>,
    },
    AssignedIssue {
        #[serde(default)]
        labels: Vec<String>,
    },
    Mention {
        #[serde(default)]
        subject_type: String,
        #[serde(default)]
        thread_url: String,
    },
    UnreadComment {
        #[serde(default)]
        subject_type: String,
        #[serde(default)]
        latest_comment_url: String,
    },
    Notification {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        subject_type: String,
    },
    FailedWorkflow {
        #[serde(default)]
        subject_type: String,
    },
}

/// A single unit of pending work, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: ItemKind,
    /// Issue or PR number; 0 for kinds without one.
    pub number: u64,
    /// `owner/name` form.
    pub repository: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub author: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub details: ItemDetails,
}

impl WorkItem {
    /// Canonical identity used for cooldown and deduplication. The
    /// state file is portable across restarts, so this format is
    /// frozen: `<kind>_<repository with / replaced by ->_<number>`.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.kind.tag(),
            self.repository.replace('/', "-"),
            self.number
        )
    }
}

/// The in-flight record persisted while an item is being worked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingItem {
    #[serde(flatten)]
    pub item: WorkItem,
    pub start_time: DateTime<Utc>,
    pub attempt_count: u32,
    pub last_attempt: DateTime<Utc>,
}

impl ProcessingItem {
    pub fn begin(item: WorkItem, now: DateTime<Utc>) -> Self {
        Self {
            item,
            start_time: now,
            attempt_count: 1,
            last_attempt: now,
        }
    }

    pub fn key(&self) -> String {
        self.item.key()
    }
}

/// Everything pending for the user at one poll, one sequence per kind.
/// Built once by the gateway and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSnapshot {
    pub review_requests: Vec<WorkItem>,
    pub assigned_prs: Vec<WorkItem>,
    pub prs_with_changes: Vec<WorkItem>,
    pub assigned_issues: Vec<WorkItem>,
    pub mentions: Vec<WorkItem>,
    pub unread_comments: Vec<WorkItem>,
    pub notifications: Vec<WorkItem>,
    pub failed_workflows: Vec<WorkItem>,
}

impl PendingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn count(&self) -> usize {
        ALL_KINDS.iter().map(|k| self.items_of(*k).len()).sum()
    }

    pub fn items_of(&self, kind: ItemKind) -> &[WorkItem] {
        match kind {
            ItemKind::ReviewRequest => &self.review_requests,
            ItemKind::AssignedPr => &self.assigned_prs,
            ItemKind::PrWithChanges => &self.prs_with_changes,
            ItemKind::AssignedIssue => &self.assigned_issues,
            ItemKind::Mention => &self.mentions,
            ItemKind::UnreadComment => &self.unread_comments,
            ItemKind::Notification => &self.notifications,
            ItemKind::FailedWorkflow => &self.failed_workflows,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        ALL_KINDS.iter().flat_map(|k| self.items_of(*k).iter())
    }

    /// Route an item into the sequence for its kind. Only the gateway
    /// calls this, while assembling a snapshot.
    pub fn push(&mut self, item: WorkItem) {
        let seq = match item.kind {
            ItemKind::ReviewRequest => &mut self.review_requests,
            ItemKind::AssignedPr => &mut self.assigned_prs,
            ItemKind::PrWithChanges => &mut self.prs_with_changes,
            ItemKind::AssignedIssue => &mut self.assigned_issues,
            ItemKind::Mention => &mut self.mentions,
            ItemKind::UnreadComment => &mut self.unread_comments,
            ItemKind::Notification => &mut self.notifications,
            ItemKind::FailedWorkflow => &mut self.failed_workflows,
        };
        seq.push(item);
    }
}
