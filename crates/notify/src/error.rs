use thiserror::Error;

/// Notifier errors
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram API returned an error
    #[error("Telegram API error: {0}")]
    Api(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid e-mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Invalid e-mail message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
