use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("state error: {0}")]
    State(#[from] mapstate_core::api::StateError),
    #[error("sync error: {0}")]
    Sync(#[from] mapstate_core::api::SyncError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    // 0: success
    // 11: config error
    // 20: IO error
    // 30: state / sync failure surfaced by the engine
    // 40: bad command input
    // 50: internal/uncategorized
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 11,
            CliError::Io(_) => 20,
            CliError::State(_) | CliError::Sync(_) => 30,
            CliError::Command(_) => 40,
            CliError::Anyhow(_) => 50,
        }
    }
}
