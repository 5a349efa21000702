//! 持久化：将状态树的全部或部分路径序列化到键值存储

mod adapter;
mod snapshot;

pub use adapter::PersistenceAdapter;
pub use snapshot::{PersistenceSnapshot, SNAPSHOT_VERSION};
