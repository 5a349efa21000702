//! 状态事件定义

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Every notification the core emits. `name()` yields the wire name
/// (`stateChange`, `state:<path>`, `computed:<name>`, `bulkOperation:started`,
/// `bulkOperation:ended`, `stateSynchronizer:ready`, `stateSynchronizer:error`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StateEvent {
    /// 任意路径的值变更，附带完整状态快照
    #[serde(rename_all = "camelCase")]
    StateChanged {
        path: String,
        value: Option<Value>,
        old_value: Option<Value>,
        state: Value,
        timestamp: DateTime<Utc>,
    },
    /// 特定路径的值变更
    #[serde(rename_all = "camelCase")]
    PathChanged {
        path: String,
        value: Option<Value>,
        old_value: Option<Value>,
        timestamp: DateTime<Utc>,
    },
    /// 计算属性重新求值
    ComputedChanged {
        name: String,
        value: Value,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    BulkOperationStarted {
        operation_type: String,
        item_count: usize,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    BulkOperationEnded {
        operation_type: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    SynchronizerReady { timestamp: DateTime<Utc> },
    SynchronizerError {
        error: String,
        component: String,
        timestamp: DateTime<Utc>,
    },
}

impl StateEvent {
    pub fn name(&self) -> String {
        match self {
            Self::StateChanged { .. } => "stateChange".to_string(),
            Self::PathChanged { path, .. } => format!("state:{path}"),
            Self::ComputedChanged { name, .. } => format!("computed:{name}"),
            Self::BulkOperationStarted { .. } => "bulkOperation:started".to_string(),
            Self::BulkOperationEnded { .. } => "bulkOperation:ended".to_string(),
            Self::SynchronizerReady { .. } => "stateSynchronizer:ready".to_string(),
            Self::SynchronizerError { .. } => "stateSynchronizer:error".to_string(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StateChanged { timestamp, .. }
            | Self::PathChanged { timestamp, .. }
            | Self::ComputedChanged { timestamp, .. }
            | Self::BulkOperationStarted { timestamp, .. }
            | Self::BulkOperationEnded { timestamp, .. }
            | Self::SynchronizerReady { timestamp }
            | Self::SynchronizerError { timestamp, .. } => *timestamp,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::StateChanged { path, .. } | Self::PathChanged { path, .. } => Some(path),
            _ => None,
        }
    }
}
