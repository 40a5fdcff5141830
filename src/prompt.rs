//! Builds the instruction text handed to the agent for each item kind.

use crate::workitem::{ItemDetails, ItemKind, ProcessingItem};

/// Assemble the full agent prompt. Pure over its inputs: the same item,
/// continuation flag and operator suffix always produce the same text.
pub fn build(item: &ProcessingItem, continue_mode: bool, agent_prompt: &str) -> String {
    let mut sections: Vec<String> = Vec::new();

    if continue_mode {
        sections.push(format!(
            "A previous attempt (this is attempt {}) did not fully resolve this work item. \
             Review what has already been done in the working directory, then complete the \
             remaining work. Do not start over unless the existing changes are unusable.",
            item.attempt_count
        ));
    }

    sections.push(identity_block(item));
    sections.push(task_block(item));

    if !agent_prompt.is_empty() {
        sections.push(agent_prompt.to_string());
    }

    sections.join("\n\n")
}

fn identity_block(item: &ProcessingItem) -> String {
    let mut lines = vec![format!("Repository: {}", item.item.repository)];
    if item.item.number > 0 {
        lines.push(format!("Number: #{}", item.item.number));
    }
    lines.push(format!("Title: {}", item.item.title));
    lines.push(format!("URL: {}", item.item.url));
    if !item.item.author.is_empty() {
        lines.push(format!("Author: {}", item.item.author));
    }
    lines.join("\n")
}

fn task_block(item: &ProcessingItem) -> String {
    match item.item.kind {
        ItemKind::ReviewRequest => {
            "You have been asked to review this pull request. Read the full diff, check the \
             changes for correctness and style, and submit a review: approve it if it is \
             sound, otherwise request changes with specific, actionable comments."
                .to_string()
        }
        ItemKind::AssignedPr => "This pull request is assigned to you. Bring it to a mergeable \
             state: address open review comments, fix failing checks, and push the necessary \
             commits."
            .to_string(),
        ItemKind::PrWithChanges => "A reviewer has requested changes on your pull request. Read \
             every review comment, apply the requested changes, push them, and reply to the \
             review threads."
            .to_string(),
        ItemKind::AssignedIssue => "This issue is assigned to you. Implement the fix or feature \
             it describes, commit the work on a branch, and open a pull request that \
             references the issue."
            .to_string(),
        ItemKind::Mention => {
            let mut text = String::from(
                "You were mentioned in this thread. Read the surrounding discussion and post a \
                 helpful response; make code changes only if the thread explicitly asks you to.",
            );
            if let ItemDetails::Mention { thread_url, .. } = &item.item.details {
                if !thread_url.is_empty() {
                    text.push_str(&format!("\nThread: {thread_url}"));
                }
            }
            text
        }
        ItemKind::UnreadComment => {
            let mut text = String::from(
                "There is an unread comment on this thread. Read it and respond to the comment, \
                 applying any changes it asks for.",
            );
            if let ItemDetails::UnreadComment {
                latest_comment_url, ..
            } = &item.item.details
            {
                if !latest_comment_url.is_empty() {
                    text.push_str(&format!("\nLatest comment: {latest_comment_url}"));
                }
            }
            text
        }
        ItemKind::Notification => {
            let mut text = String::from(
                "Review this notification and take whatever action it calls for. If nothing is \
                 required of you, it is fine to do nothing beyond confirming that.",
            );
            if let ItemDetails::Notification { reason, .. } = &item.item.details {
                if !reason.is_empty() {
                    text.push_str(&format!("\nNotification reason: {reason}"));
                }
            }
            text
        }
        ItemKind::FailedWorkflow => "A CI workflow run for this repository failed. Inspect the \
             failing run's logs, find the root cause, and push a fix for the failure."
            .to_string(),
    }
}
