//! 无界面渲染面：CLI 与测试用的标签/活动列表/同步处理器实现

mod headless;

pub use headless::HeadlessSurface;
