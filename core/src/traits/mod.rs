//! 外部协作方接口：调度、持久化存储、标签渲染与同步处理

mod scheduler;
mod storage;
mod surface;
mod sync;

pub use scheduler::{Scheduler, TokioScheduler};
pub use storage::{KeyValueStorage, MemoryStorage};
pub use surface::{ActiveListRenderer, LabelMaterializer};
pub use sync::SyncHandlers;
