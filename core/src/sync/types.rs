use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::time::Instant;

/// External signals that ask for a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncTrigger {
    DataCategoryLoaded,
    DataCategoryErrored,
    FeatureLayerChanged,
    CheckboxChanged,
    ToggleAllChanged,
    Heartbeat,
    /// Recorded for `force_sync` passes; `queue_sync` rejects it.
    Forced,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataCategoryLoaded => "dataCategoryLoaded",
            Self::DataCategoryErrored => "dataCategoryErrored",
            Self::FeatureLayerChanged => "featureLayerChanged",
            Self::CheckboxChanged => "checkboxChanged",
            Self::ToggleAllChanged => "toggleAllChanged",
            Self::Heartbeat => "heartbeat",
            Self::Forced => "forced",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOperation {
    pub id: u64,
    pub trigger: SyncTrigger,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    /// Attempts made so far.
    pub attempt_count: u32,
    /// Set after a failed attempt; the operation is held back until then.
    #[serde(skip)]
    pub not_before: Option<Instant>,
}

impl SyncOperation {
    pub(crate) fn new(id: u64, trigger: SyncTrigger, payload: Value) -> Self {
        Self {
            id,
            trigger,
            payload,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            not_before: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncOutcome {
    Succeeded,
    Failed { error: String },
}

/// History entry for a finished operation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRecord {
    pub id: u64,
    pub trigger: SyncTrigger,
    pub payload: Value,
    pub attempts: u32,
    pub outcome: SyncOutcome,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub queue_length: usize,
    pub is_processing: bool,
    pub timer_armed: bool,
    pub heartbeat_running: bool,
    pub passes: u64,
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub history: Vec<SyncRecord>,
}
