use model::MetainfoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("Authentication failed at {0}")]
    Authentication(String),

    #[error("Download link not found at {0}")]
    LinkNotFound(String),

    #[error("Invalid torrent payload from {url}: {source}")]
    InvalidPayload {
        url: String,
        #[source]
        source: MetainfoError,
    },

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TrackerError {
    /// Transport level failure (connection, timeout, bad status).
    pub fn is_network(&self) -> bool {
        matches!(self, TrackerError::Request(_) | TrackerError::Status { .. })
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
