use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("invalid state path: {0:?}")]
    InvalidPath(String),
    #[error("computed property `{name}` failed: {source}")]
    ComputedGetter {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage error for key {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("serialize snapshot failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("deserialize snapshot {key} failed: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no snapshot stored under key {0}")]
    NotFound(String),
    #[error("invalid snapshot {key}: {reason}")]
    InvalidSnapshot { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync handler failed for {trigger}: {source}")]
    Handler {
        trigger: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid payload for {trigger}: {reason}")]
    InvalidPayload { trigger: String, reason: String },
}
