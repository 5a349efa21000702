#[allow(clippy::module_inception)]
pub mod error;

pub use error::{PersistenceError, StateError, SyncError};
