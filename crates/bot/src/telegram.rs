use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use model::{find_url, from_settings, to_settings, PluginSettings};
use notify::{escape_html, TelegramClient, Update, DEFAULT_API_URL};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::{Bot, BotCommands};

const HELP: &str = "Commands:\n\
    /list - registered torrents\n\
    /add URL - add a torrent from a tracker page\n\
    /remove HASH - remove a torrent, keeping its data\n\
    /walk - check trackers for updates now";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramBotSettings {
    pub token: String,
    /// Chats allowed to issue commands.
    pub allowed_chats: Vec<i64>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

/// Long-polling Telegram command bot.
pub struct TelegramBot {
    settings: TelegramBotSettings,
    client: TelegramClient,
}

impl TelegramBot {
    pub const ALIAS: &'static str = "telegram";

    pub fn new(settings: TelegramBotSettings) -> Result<Self> {
        if settings.token.is_empty() {
            return Err(BotError::Config("token is required".into()));
        }
        if settings.allowed_chats.is_empty() {
            return Err(BotError::Config("allowed_chats must list at least one chat".into()));
        }
        let client = TelegramClient::with_token(&settings.api_url, &settings.token)?;
        Ok(Self { settings, client })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Bot>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| BotError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    /// Reply text for one message.
    async fn handle_command(&self, commands: &dyn BotCommands, chat_id: i64, text: &str) -> String {
        if !self.settings.allowed_chats.contains(&chat_id) {
            tracing::warn!("Ignoring command from unknown chat {}", chat_id);
            return "Access denied".to_string();
        }

        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        // Commands in groups arrive as `/list@SomeBot`.
        let command = command.split('@').next().unwrap_or_default();
        let argument = parts.next().unwrap_or_default().trim();
        tracing::debug!("Bot command {} from chat {}", command, chat_id);

        let reply = match command {
            "/list" => commands.registered_torrents().await.map(|torrents| {
                if torrents.is_empty() {
                    return "No torrents registered".to_string();
                }
                torrents
                    .iter()
                    .map(|t| format!("<code>{}</code> {}", t.hash, escape_html(t.display_name())))
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
            "/add" => match find_url(argument) {
                Some(url) => commands
                    .add_torrent(url)
                    .await
                    .map(|t| format!("Added {}", escape_html(t.display_name()))),
                None => Ok("Usage: /add URL".to_string()),
            },
            "/remove" if !argument.is_empty() => commands
                .remove_torrent(argument)
                .await
                .map(|_| format!("Removed {}", escape_html(argument))),
            "/remove" => Ok("Usage: /remove HASH".to_string()),
            "/walk" => commands.walk().await.map(|updated| {
                if updated.is_empty() {
                    return "Nothing to update".to_string();
                }
                let names: Vec<_> = updated.iter().map(|t| escape_html(t.display_name())).collect();
                format!("Updated:\n{}", names.join("\n"))
            }),
            _ => Ok(HELP.to_string()),
        };

        reply.unwrap_or_else(|e| {
            tracing::error!("Bot command {} failed: {}", command, e);
            format!("Error: {}", escape_html(&e.to_string()))
        })
    }

    /// One long-poll round; returns the next offset.
    async fn poll_once(&self, commands: &dyn BotCommands, offset: i64) -> Result<i64> {
        let updates: Vec<Update> = self
            .client
            .get_updates(offset, self.settings.poll_timeout)
            .await?;

        let mut next = offset;
        for update in updates {
            next = next.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let chat_id = message.chat.id;
            let reply = self.handle_command(commands, chat_id, &text).await;
            if let Err(e) = self.client.send_message(&chat_id.to_string(), &reply).await {
                tracing::warn!("Failed to reply to chat {}: {}", chat_id, e);
            }
        }
        Ok(next)
    }
}

#[async_trait]
impl Bot for TelegramBot {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    async fn run(&self, commands: Arc<dyn BotCommands>) -> Result<()> {
        tracing::info!("Telegram bot is running");
        let mut offset = 0;
        loop {
            match self.poll_once(commands.as_ref(), offset).await {
                Ok(next) => offset = next,
                Err(e) => {
                    tracing::warn!("Telegram polling failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn test_configuration(&self) -> Result<bool> {
        self.client.get_me().await?;
        Ok(true)
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}
