//! Chat bots that expose a few engine operations to a chat.

mod error;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use model::{PluginSettings, TorrentRecord};

pub use error::{BotError, Result};
pub use telegram::{TelegramBot, TelegramBotSettings};

/// Engine operations reachable from a chat.
#[async_trait]
pub trait BotCommands: Send + Sync {
    async fn registered_torrents(&self) -> Result<Vec<TorrentRecord>>;

    /// Fetch a torrent from a tracker page, add it to the clients and register it.
    async fn add_torrent(&self, url: &str) -> Result<TorrentRecord>;

    /// Remove a torrent from the clients (keeping data) and unregister it.
    async fn remove_torrent(&self, hash: &str) -> Result<()>;

    /// Forced walk; returns the replaced torrents.
    async fn walk(&self) -> Result<Vec<TorrentRecord>>;
}

#[async_trait]
pub trait Bot: Send + Sync {
    fn alias(&self) -> &str;

    /// Serve commands until the task is cancelled.
    async fn run(&self, commands: Arc<dyn BotCommands>) -> Result<()>;

    async fn test_configuration(&self) -> Result<bool>;

    fn to_settings(&self) -> PluginSettings;
}

pub type SpawnBot = fn(&PluginSettings) -> Result<Arc<dyn Bot>>;

#[derive(Clone, Copy)]
pub struct BotClass {
    pub alias: &'static str,
    pub spawn: SpawnBot,
}

pub fn classes() -> Vec<BotClass> {
    vec![BotClass {
        alias: TelegramBot::ALIAS,
        spawn: TelegramBot::spawn,
    }]
}
