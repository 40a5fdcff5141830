//! Decides whether the in-flight item is done, by comparing it against
//! the latest pending snapshot.

use crate::workitem::{PendingSnapshot, ProcessingItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The item no longer appears in its sequence: resolved.
    ItemNotFound,
    /// A match exists but its title or URL moved on. Informational,
    /// the loop keeps working the item.
    ItemChanged,
    ItemStillPending,
}

/// Match the in-flight item against the sequence for its kind, by
/// `(number, repository)`. One-shot kinds have no content to diff, so
/// presence alone decides for them.
pub fn check(current: &ProcessingItem, snapshot: &PendingSnapshot) -> ResolutionOutcome {
    let matched = snapshot
        .items_of(current.item.kind)
        .iter()
        .find(|c| c.number == current.item.number && c.repository == current.item.repository);

    match matched {
        None => ResolutionOutcome::ItemNotFound,
        Some(_) if current.item.kind.is_one_shot() => ResolutionOutcome::ItemStillPending,
        Some(c) if c.title != current.item.title || c.url != current.item.url => {
            ResolutionOutcome::ItemChanged
        }
        Some(_) => ResolutionOutcome::ItemStillPending,
    }
}
