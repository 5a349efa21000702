//! 同步队列：外部触发去抖、FIFO 执行、有限重试与心跳兜底

mod processor;
mod types;

pub use processor::SyncQueueProcessor;
pub use types::{SyncOperation, SyncOutcome, SyncRecord, SyncStatus, SyncTrigger};
