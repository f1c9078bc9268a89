use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("Malformed torrent: {0}")]
    Malformed(String),

    #[error("Torrent has no info dictionary")]
    MissingInfo,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings for `{alias}`: {message}")]
    Invalid { alias: String, message: String },
}

pub type Result<T> = std::result::Result<T, MetainfoError>;
