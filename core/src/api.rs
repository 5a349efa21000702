//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `mapstate_core::api` instead of reaching into internal modules.

pub use crate::bulk::{
    BatchReport, BulkFlushReport, BulkOperationCoordinator, BulkOperationStatus,
    DeferredBatchProcessor, LabelAnchor, LabelRequest,
};
pub use crate::config::{
    load_default, load_from_path, AppConfig, BulkConfig, LoggingConfig, StoreConfig, SyncConfig,
};
pub use crate::context::{new_store, AppContext, Services, ServicesFactory};
pub use crate::error::{PersistenceError, StateError, SyncError};
pub use crate::persistence::{PersistenceAdapter, PersistenceSnapshot};
pub use crate::state::{
    EventBus, MiddlewareId, StateEvent, StateFacade, StateStore, WatchHandle,
};
pub use crate::sync::{SyncQueueProcessor, SyncRecord, SyncStatus, SyncTrigger};
pub use crate::traits::{
    ActiveListRenderer, KeyValueStorage, LabelMaterializer, MemoryStorage, Scheduler,
    SyncHandlers, TokioScheduler,
};
