use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Telegram(#[from] notify::NotifyError),

    /// An engine operation invoked by a command failed.
    #[error("Command failed: {0}")]
    Command(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BotError>;
