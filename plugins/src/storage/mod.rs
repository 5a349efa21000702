//! KeyValueStorage 实现

mod file;

pub use file::FileStorage;
