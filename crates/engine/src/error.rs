use thiserror::Error;

use crate::registry::RegistryError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Tracker(#[from] tracker::TrackerError),

    #[error(transparent)]
    Rpc(#[from] rpc::RpcError),

    #[error(transparent)]
    Notify(#[from] notify::NotifyError),

    #[error(transparent)]
    Bot(#[from] bot::BotError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid settings: {0}")]
    Settings(#[from] model::SettingsError),

    #[error("Unknown {family} `{alias}`")]
    UnknownAlias { family: &'static str, alias: String },

    #[error("No tracker can handle {0}")]
    NoTracker(String),

    #[error("No enabled RPC client is configured")]
    NoRpc,

    #[error("`{0}` failed its configuration test")]
    TestFailed(String),
}

impl EngineError {
    pub fn unknown(family: &'static str, alias: impl Into<String>) -> Self {
        EngineError::UnknownAlias {
            family,
            alias: alias.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
