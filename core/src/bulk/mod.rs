//! 批量操作：互斥的批量区间、延迟标签队列与分批落地

mod batch;
mod coordinator;
mod types;

pub use batch::DeferredBatchProcessor;
pub use coordinator::BulkOperationCoordinator;
pub use types::{
    BatchReport, BulkFlushReport, BulkOperation, BulkOperationStatus, LabelAnchor, LabelRequest,
};
