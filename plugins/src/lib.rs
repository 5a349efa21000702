pub mod factory;
pub mod services;
pub mod storage;
pub mod surface;
