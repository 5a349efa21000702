use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "mapstate_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity of the broadcast channel carrying `StateEvent`s.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Prefix applied to every persistence key before it reaches storage.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Directory for file-backed snapshots. Unset means in-memory storage.
    #[serde(default)]
    pub storage_dir: Option<String>,
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_key_prefix() -> String {
    "mapstate:".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            key_prefix: default_key_prefix(),
            storage_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    #[serde(default = "default_category_batch_sizes")]
    pub category_batch_sizes: HashMap<String, usize>,

    /// Category whose labels are costly enough to be materialized one at a
    /// time with a timed pause in between.
    #[serde(default = "default_expensive_category")]
    pub expensive_category: Option<String>,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_expensive_delay_ms")]
    pub expensive_delay_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_category_batch_sizes() -> HashMap<String, usize> {
    [("ses", 10), ("cfa", 10), ("ambulance", 10), ("police", 8), ("frv", 8)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_expensive_category() -> Option<String> {
    Some("lga".to_string())
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_expensive_delay_ms() -> u64 {
    50
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            category_batch_sizes: default_category_batch_sizes(),
            expensive_category: default_expensive_category(),
            frame_interval_ms: default_frame_interval_ms(),
            expensive_delay_ms: default_expensive_delay_ms(),
        }
    }
}

impl BulkConfig {
    pub fn is_expensive(&self, category: &str) -> bool {
        self.expensive_category.as_deref() == Some(category)
    }

    /// Effective batch size for `category`; never zero.
    pub fn batch_size_for(&self, category: &str) -> usize {
        if self.is_expensive(category) {
            return 1;
        }
        self.category_batch_sizes
            .get(category)
            .copied()
            .unwrap_or(self.default_batch_size)
            .max(1)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn expensive_delay(&self) -> Duration {
        Duration::from_millis(self.expensive_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Total attempts per operation, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Heartbeat period; 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_history_capacity() -> usize {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}
