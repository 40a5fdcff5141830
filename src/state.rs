//! Persistent processing state: the single in-flight item plus recent
//! failure records with their cooldown deadlines.
//!
//! The state document lives at `<app-dir>/processing_state.json` and is
//! rewritten atomically (sibling temp file, fsync, rename) on every
//! mutation, so a crash never leaves a partial write behind.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::workitem::ProcessingItem;

/// Cooldown grows linearly with the failure count: `count × 30 min`.
pub const COOLDOWN_STEP_MINUTES: i64 = 30;

/// Failure records older than this are garbage-collected.
pub const FAILURE_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no item is currently being processed")]
    NoCurrentItem,
    #[error("state IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failure_count: u32,
    pub last_failure: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

/// The persisted document. Field names and timestamp format are frozen:
/// a state file written by one conforming build must load in any other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(default)]
    pub current_item: Option<ProcessingItem>,
    #[serde(default)]
    pub recent_failures: BTreeMap<String, FailureRecord>,
    pub last_updated: DateTime<Utc>,
}

impl ProcessingState {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            current_item: None,
            recent_failures: BTreeMap::new(),
            last_updated: now,
        }
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.recent_failures
            .get(key)
            .map(|r| r.failure_count)
            .unwrap_or(0)
    }

    pub fn in_cooldown(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.recent_failures
            .get(key)
            .map(|r| now < r.cooldown_until)
            .unwrap_or(false)
    }
}

/// Durable store for [`ProcessingState`]. Mutators persist before they
/// return, so across ticks the file always reflects the latest
/// transition.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<ProcessingState>,
}

impl StateStore {
    /// Open the store, loading any existing document. A corrupt file is
    /// logged and replaced with an empty state rather than failing the
    /// process.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<ProcessingState>(&contents) {
                Ok(state) => {
                    debug!(file = ?path, last_updated = %state.last_updated, "Loaded processing state");
                    state
                }
                Err(e) => {
                    warn!(file = ?path, error = %e, "Processing state file is corrupt, starting from empty state");
                    ProcessingState::empty(Utc::now())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = ?path, "No existing processing state file");
                ProcessingState::empty(Utc::now())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn current_item(&self) -> Option<ProcessingItem> {
        self.state.lock().unwrap().current_item.clone()
    }

    /// Read-only copy of the whole document, for callers that score or
    /// inspect without mutating (the prioritizer, the status command).
    pub fn view(&self) -> ProcessingState {
        self.state.lock().unwrap().clone()
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.state.lock().unwrap().failure_count(key)
    }

    pub fn in_cooldown(&self, key: &str) -> bool {
        self.state.lock().unwrap().in_cooldown(key, Utc::now())
    }

    /// Replace the current in-flight item and persist.
    pub async fn set_current(&self, item: ProcessingItem) -> Result<(), StateError> {
        let doc = {
            let mut state = self.state.lock().unwrap();
            state.current_item = Some(item);
            state.last_updated = Utc::now();
            state.clone()
        };
        self.persist(&doc).await
    }

    /// Clear the in-flight item and persist.
    pub async fn clear_current(&self) -> Result<(), StateError> {
        let doc = {
            let mut state = self.state.lock().unwrap();
            state.current_item = None;
            state.last_updated = Utc::now();
            state.clone()
        };
        self.persist(&doc).await
    }

    /// Bump the attempt counter on the current item and persist.
    /// Returns the new counter value.
    pub async fn increment_attempt(&self) -> Result<u32, StateError> {
        let (doc, attempts) = {
            let mut state = self.state.lock().unwrap();
            let item = state.current_item.as_mut().ok_or(StateError::NoCurrentItem)?;
            item.attempt_count += 1;
            item.last_attempt = Utc::now();
            let attempts = item.attempt_count;
            state.last_updated = Utc::now();
            (state.clone(), attempts)
        };
        self.persist(&doc).await?;
        Ok(attempts)
    }

    /// Record an abandonment for `key`: bump the failure count and push
    /// the cooldown deadline out by `failure_count × 30 min` from now.
    pub async fn record_failure(&self, key: &str) -> Result<FailureRecord, StateError> {
        let (doc, record) = {
            let mut state = self.state.lock().unwrap();
            let now = Utc::now();
            let count = state.failure_count(key) + 1;
            let record = FailureRecord {
                failure_count: count,
                last_failure: now,
                cooldown_until: now + Duration::minutes(count as i64 * COOLDOWN_STEP_MINUTES),
            };
            state.recent_failures.insert(key.to_string(), record.clone());
            state.last_updated = now;
            (state.clone(), record)
        };
        self.persist(&doc).await?;
        info!(
            key = %key,
            failure_count = record.failure_count,
            cooldown_until = %record.cooldown_until,
            "Recorded failure"
        );
        Ok(record)
    }

    /// Drop failure records whose last failure is older than 24 h.
    /// Returns how many were removed.
    pub async fn cleanup_old_failures(&self) -> Result<usize, StateError> {
        let (doc, removed) = {
            let mut state = self.state.lock().unwrap();
            let cutoff = Utc::now() - Duration::hours(FAILURE_RETENTION_HOURS);
            let before = state.recent_failures.len();
            state.recent_failures.retain(|_, r| r.last_failure >= cutoff);
            let removed = before - state.recent_failures.len();
            if removed == 0 {
                return Ok(0);
            }
            state.last_updated = Utc::now();
            (state.clone(), removed)
        };
        self.persist(&doc).await?;
        debug!(removed, "Cleaned up expired failure records");
        Ok(removed)
    }

    async fn persist(&self, doc: &ProcessingState) -> Result<(), StateError> {
        let serialized = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(serialized.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}
