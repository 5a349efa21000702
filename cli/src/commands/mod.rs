pub mod cli;
pub mod config;
pub mod persist;
pub mod simulate;
pub mod sync;
