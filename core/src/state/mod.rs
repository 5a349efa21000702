//! # 状态管理模块
//!
//! 响应式状态容器：点分路径寻址的状态树、中间件、路径监听器、计算属性，
//! 以及所有组件共用的事件广播通道。
//!
//! ## 设计原则
//!
//! 1. **显式访问**：所有读写通过 `StateStore` 的方法，不做透明拦截
//! 2. **变更抑制**：新旧值相等时不触发任何通知
//! 3. **故障隔离**：单个监听器失败不影响写入和其他监听器
//! 4. **计算属性**：依赖变更时立即重算并缓存

mod computed;
pub mod events;
pub mod facade;
pub mod manager;
mod middleware;
pub mod types;
mod watchers;

pub use computed::ComputedGetter;
pub use events::EventBus;
pub use facade::StateFacade;
pub use manager::{StateStore, WatchHandle};
pub use middleware::{Middleware, MiddlewareId};
pub use types::StateEvent;
pub use watchers::WatchCallback;
