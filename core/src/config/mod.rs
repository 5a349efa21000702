mod load;
mod types;

pub use load::{get_mapstate_data_dir, load_default, load_from_path};
pub use types::{AppConfig, BulkConfig, LoggingConfig, StoreConfig, SyncConfig};
