//! mapstate-core: 响应式状态容器、批量操作协调与同步队列

pub mod api;
pub mod bulk;
pub mod config;
pub mod context;
pub mod error;
pub mod persistence;
pub mod state;
pub mod sync;
pub mod traits;
pub mod util;
