//! Ranks the pending snapshot and picks the single best item that is
//! eligible to work on.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::state::ProcessingState;
use crate::workitem::{ItemKind, PendingSnapshot, WorkItem};

/// Title keywords worth +500. One match is enough, more don't stack.
const URGENCY_KEYWORDS: [&str; 7] = [
    "urgent",
    "critical",
    "blocker",
    "hotfix",
    "emergency",
    "p0",
    "sev1",
];

/// Title keywords worth +200, same single-match rule.
const HIGH_PRIORITY_KEYWORDS: [&str; 7] = ["bug", "fix", "error", "broken", "failing", "p1", "sev2"];

const FAILURE_PENALTY_STEP: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedItem {
    pub item: WorkItem,
    pub score: i64,
    pub reason: String,
}

fn base_score(kind: ItemKind) -> i64 {
    match kind {
        ItemKind::ReviewRequest => 1000,
        ItemKind::Mention => 900,
        ItemKind::AssignedPr => 800,
        ItemKind::FailedWorkflow => 700,
        ItemKind::PrWithChanges => 600,
        ItemKind::UnreadComment => 500,
        ItemKind::AssignedIssue => 400,
        ItemKind::Notification => 300,
    }
}

/// Single tier, largest applicable: 7 d → +300, 3 d → +200, 1 d → +100.
fn age_bonus(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let age = now.signed_duration_since(updated_at);
    if age >= chrono::Duration::days(7) {
        300
    } else if age >= chrono::Duration::days(3) {
        200
    } else if age >= chrono::Duration::days(1) {
        100
    } else {
        0
    }
}

fn keyword_bonus(title: &str, keywords: &[&str], bonus: i64) -> i64 {
    let lower = title.to_lowercase();
    if keywords.iter().any(|k| lower.contains(k)) {
        bonus
    } else {
        0
    }
}

fn score_item(item: &WorkItem, state: &ProcessingState, now: DateTime<Utc>) -> PrioritizedItem {
    let base = base_score(item.kind);
    let age = age_bonus(item.updated_at, now);
    let urgency = keyword_bonus(&item.title, &URGENCY_KEYWORDS, 500);
    let high = keyword_bonus(&item.title, &HIGH_PRIORITY_KEYWORDS, 200);
    let penalty = FAILURE_PENALTY_STEP * state.failure_count(&item.key()) as i64;

    let mut parts = vec![format!("base {base} ({})", item.kind)];
    if age > 0 {
        parts.push(format!("age +{age}"));
    }
    if urgency > 0 {
        parts.push(format!("urgency +{urgency}"));
    }
    if high > 0 {
        parts.push(format!("priority +{high}"));
    }
    if penalty > 0 {
        parts.push(format!("failures -{penalty}"));
    }

    PrioritizedItem {
        item: item.clone(),
        score: base + age + urgency + high - penalty,
        reason: parts.join(", "),
    }
}

/// Return the highest-scored candidate whose key is neither in cooldown
/// nor already in flight, or `None` when nothing is eligible.
///
/// Pure over `(snapshot, state, now)`: never touches the network, so
/// equal inputs always select the same item (ties break on ascending
/// key).
pub fn select_next(
    snapshot: &PendingSnapshot,
    state: &ProcessingState,
    now: DateTime<Utc>,
) -> Option<PrioritizedItem> {
    let current_key = state.current_item.as_ref().map(|c| c.key());

    let mut candidates: Vec<(String, PrioritizedItem)> = snapshot
        .iter()
        .filter_map(|item| {
            let key = item.key();
            if Some(&key) == current_key.as_ref() {
                return None;
            }
            if state.in_cooldown(&key, now) {
                debug!(key = %key, "Skipping candidate in cooldown");
                return None;
            }
            Some((key, score_item(item, state, now)))
        })
        .collect();

    candidates.sort_by(|(ka, a), (kb, b)| b.score.cmp(&a.score).then_with(|| ka.cmp(kb)));
    candidates.into_iter().next().map(|(_, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureRecord;
    use crate::workitem::ItemDetails;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn item(kind: ItemKind, number: u64, repo: &str, title: &str, age_days: i64) -> WorkItem {
        WorkItem {
            kind,
            number,
            repository: repo.to_string(),
            title: title.to_string(),
            url: format!("https://github.com/{repo}/issues/{number}"),
            author: String::new(),
            updated_at: Utc::now() - Duration::days(age_days),
            details: ItemDetails::Empty,
        }
    }

    fn empty_state() -> ProcessingState {
        ProcessingState {
            current_item: None,
            recent_failures: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    fn state_with_failure(key: &str, count: u32, cooling: bool) -> ProcessingState {
        let now = Utc::now();
        let mut state = empty_state();
        state.recent_failures.insert(
            key.to_string(),
            FailureRecord {
                failure_count: count,
                last_failure: now - Duration::minutes(10),
                cooldown_until: if cooling {
                    now + Duration::minutes(20)
                } else {
                    now - Duration::minutes(1)
                },
            },
        );
        state
    }

    #[test]
    fn base_scores_match_kind_table() {
        assert_eq!(base_score(ItemKind::ReviewRequest), 1000);
        assert_eq!(base_score(ItemKind::Mention), 900);
        assert_eq!(base_score(ItemKind::AssignedPr), 800);
        assert_eq!(base_score(ItemKind::FailedWorkflow), 700);
        assert_eq!(base_score(ItemKind::PrWithChanges), 600);
        assert_eq!(base_score(ItemKind::UnreadComment), 500);
        assert_eq!(base_score(ItemKind::AssignedIssue), 400);
        assert_eq!(base_score(ItemKind::Notification), 300);
    }

    #[test]
    fn age_bonus_uses_largest_applicable_tier() {
        let now = Utc::now();
        assert_eq!(age_bonus(now, now), 0);
        assert_eq!(age_bonus(now - Duration::hours(23), now), 0);
        assert_eq!(age_bonus(now - Duration::days(1), now), 100);
        assert_eq!(age_bonus(now - Duration::days(3), now), 200);
        assert_eq!(age_bonus(now - Duration::days(6), now), 200);
        assert_eq!(age_bonus(now - Duration::days(7), now), 300);
        assert_eq!(age_bonus(now - Duration::days(30), now), 300);
    }

    #[test]
    fn cooldown_candidate_is_skipped() {
        let mut snapshot = PendingSnapshot::default();
        let review = item(ItemKind::ReviewRequest, 1, "acme/api", "Review me", 0);
        snapshot.push(review.clone());
        snapshot.push(item(ItemKind::AssignedPr, 7, "acme/api", "Assigned", 0));

        let state = state_with_failure(&review.key(), 1, true);
        let selected = select_next(&snapshot, &state, Utc::now()).unwrap();
        assert_eq!(selected.item.number, 7);
        assert_eq!(selected.item.kind, ItemKind::AssignedPr);
    }

    #[test]
    fn expired_cooldown_still_pays_the_failure_penalty() {
        let mut snapshot = PendingSnapshot::default();
        let review = item(ItemKind::ReviewRequest, 1, "acme/api", "Review me", 0);
        snapshot.push(review.clone());

        let state = state_with_failure(&review.key(), 2, false);
        let selected = select_next(&snapshot, &state, Utc::now()).unwrap();
        assert_eq!(selected.score, 1000 - 200);
        assert!(selected.reason.contains("failures -200"));
    }

    #[test]
    fn urgency_does_not_outrank_review_request_base() {
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(item(
            ItemKind::AssignedIssue,
            5,
            "acme/api",
            "URGENT: data loss",
            0,
        ));
        snapshot.push(item(
            ItemKind::ReviewRequest,
            6,
            "acme/api",
            "nit: rename var",
            0,
        ));

        // 400 + 500 = 900 vs 1000: the review request wins.
        let selected = select_next(&snapshot, &empty_state(), Utc::now()).unwrap();
        assert_eq!(selected.item.kind, ItemKind::ReviewRequest);
        assert_eq!(selected.score, 1000);

        // Stacking more urgency keywords does not stack the bonus.
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(item(
            ItemKind::AssignedIssue,
            5,
            "acme/api",
            "URGENT P0 blocker",
            0,
        ));
        snapshot.push(item(
            ItemKind::ReviewRequest,
            6,
            "acme/api",
            "nit: rename var",
            0,
        ));
        let selected = select_next(&snapshot, &empty_state(), Utc::now()).unwrap();
        assert_eq!(selected.item.kind, ItemKind::ReviewRequest);

        // An 8-day-old review request only pulls further ahead.
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(item(
            ItemKind::AssignedIssue,
            5,
            "acme/api",
            "URGENT P0 blocker",
            0,
        ));
        snapshot.push(item(
            ItemKind::ReviewRequest,
            6,
            "acme/api",
            "nit: rename var",
            8,
        ));
        let selected = select_next(&snapshot, &empty_state(), Utc::now()).unwrap();
        assert_eq!(selected.item.kind, ItemKind::ReviewRequest);
        assert_eq!(selected.score, 1300);
    }

    #[test]
    fn high_priority_keywords_add_two_hundred() {
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(item(
            ItemKind::AssignedIssue,
            5,
            "acme/api",
            "fix broken pagination",
            0,
        ));
        let selected = select_next(&snapshot, &empty_state(), Utc::now()).unwrap();
        // Multiple high-priority words still count once.
        assert_eq!(selected.score, 400 + 200);
    }

    #[test]
    fn ties_break_on_ascending_key() {
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(item(ItemKind::AssignedIssue, 20, "acme/api", "plain", 0));
        snapshot.push(item(ItemKind::AssignedIssue, 10, "acme/api", "plain", 0));

        let selected = select_next(&snapshot, &empty_state(), Utc::now()).unwrap();
        // "...._10" < "...._20"
        assert_eq!(selected.item.number, 10);
    }

    #[test]
    fn in_flight_item_is_never_reselected() {
        let work = item(ItemKind::ReviewRequest, 1, "acme/api", "Review me", 0);
        let mut snapshot = PendingSnapshot::default();
        snapshot.push(work.clone());

        let mut state = empty_state();
        state.current_item = Some(crate::workitem::ProcessingItem::begin(work, Utc::now()));

        assert!(select_next(&snapshot, &state, Utc::now()).is_none());
    }

    #[test]
    fn empty_snapshot_selects_nothing() {
        assert!(select_next(&PendingSnapshot::default(), &empty_state(), Utc::now()).is_none());
    }

    #[test]
    fn reason_formats_penalty_as_integer() {
        let work = item(ItemKind::ReviewRequest, 1, "acme/api", "Review me", 0);
        let state = state_with_failure(&work.key(), 1, false);
        let scored = score_item(&work, &state, Utc::now());
        assert!(scored.reason.contains("failures -100"));
        assert!(scored.reason.is_ascii());
    }
}
