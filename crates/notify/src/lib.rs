//! Notification sinks invoked once per walk with the torrents that were replaced.
//!
//! # Example
//!
//! ```rust,ignore
//! use notify::{TelegramNotifier, TelegramSettings};
//!
//! let notifier = TelegramNotifier::new(TelegramSettings { .. })?;
//! notifier.send(&updated).await?;
//! ```

mod client;
mod email;
mod error;
mod telegram;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use model::{PluginSettings, TorrentRecord};

pub use client::{escape_html, Chat, Message, TelegramClient, Update, DEFAULT_API_URL};
pub use email::{EmailNotifier, EmailSettings};
pub use error::{NotifyError, Result};
pub use telegram::{TelegramNotifier, TelegramSettings};

/// Notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    fn alias(&self) -> &str;

    /// Send a plain text message
    async fn send_message(&self, text: &str) -> Result<()>;

    /// Report replaced torrents, keyed by the old info-hash.
    async fn send(&self, updated: &BTreeMap<String, TorrentRecord>) -> Result<()> {
        self.send_message(&make_message(updated)).await
    }

    async fn test_configuration(&self) -> Result<bool> {
        self.send_message("Notification test").await?;
        Ok(true)
    }

    fn to_settings(&self) -> PluginSettings;
}

/// Plain text report, one torrent name per line.
pub fn make_message(updated: &BTreeMap<String, TorrentRecord>) -> String {
    let mut text = String::from("The following torrents were updated:\n");
    for record in updated.values() {
        text.push_str(record.display_name());
        text.push('\n');
    }
    text
}

pub type SpawnNotifier = fn(&PluginSettings) -> Result<Arc<dyn Notifier>>;

#[derive(Clone, Copy)]
pub struct NotifierClass {
    pub alias: &'static str,
    pub spawn: SpawnNotifier,
}

pub fn classes() -> Vec<NotifierClass> {
    vec![
        NotifierClass {
            alias: TelegramNotifier::ALIAS,
            spawn: TelegramNotifier::spawn,
        },
        NotifierClass {
            alias: EmailNotifier::ALIAS,
            spawn: EmailNotifier::spawn,
        },
    ]
}
