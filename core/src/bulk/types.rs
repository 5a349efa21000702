use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelAnchor {
    pub lat: f64,
    pub lng: f64,
}

/// A deferred request to materialize the label of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRequest {
    pub category: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<LabelAnchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl LabelRequest {
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            anchor: None,
            text: None,
        }
    }

    pub fn with_anchor(mut self, lat: f64, lng: f64) -> Self {
        self.anchor = Some(LabelAnchor { lat, lng });
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// The single active bulk operation.
#[derive(Debug)]
pub struct BulkOperation {
    pub id: String,
    pub operation_type: String,
    pub item_count: usize,
    pub started_at: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) pending_labels: Vec<LabelRequest>,
    pub(crate) pending_active_list_update: bool,
}

impl BulkOperation {
    pub(crate) fn new(operation_type: &str, item_count: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation_type: operation_type.to_string(),
            item_count,
            started_at: Utc::now(),
            started: Instant::now(),
            pending_labels: Vec::new(),
            pending_active_list_update: false,
        }
    }

    pub(crate) fn status(&self) -> BulkOperationStatus {
        BulkOperationStatus {
            id: self.id.clone(),
            operation_type: self.operation_type.clone(),
            item_count: self.item_count,
            started_at: self.started_at,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            pending_labels: self.pending_labels.len(),
            pending_active_list_update: self.pending_active_list_update,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationStatus {
    pub id: String,
    pub operation_type: String,
    pub item_count: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub pending_labels: usize,
    pub pending_active_list_update: bool,
}

/// Outcome of draining a label queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub materialized: usize,
    pub stale: usize,
    pub failed: usize,
    pub batches: usize,
    pub yields: usize,
}

/// Outcome of `BulkOperationCoordinator::end`.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFlushReport {
    pub operation_type: String,
    pub item_count: usize,
    pub duration_ms: u64,
    pub labels: BatchReport,
    pub active_list_refreshed: bool,
}
