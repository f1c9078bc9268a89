use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("RPC call failed: {0}")]
    Protocol(String),

    #[error("Invalid torrent: {0}")]
    InvalidTorrent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether the daemon rejected our credentials or session.
    pub fn is_auth_error(&self) -> bool {
        match self {
            RpcError::Auth(_) => true,
            RpcError::Api { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Protocol(format!("malformed response: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
