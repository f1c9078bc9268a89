use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{NotifyError, Result};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Telegram Bot API client
pub struct TelegramClient {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(client: Client, api_url: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Client with the default 10 second timeout.
    pub fn with_token(api_url: impl Into<String>, bot_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::new(client, api_url, bot_token))
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_url.trim_end_matches('/'),
            self.bot_token,
            method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value, timeout: Option<Duration>) -> Result<T> {
        let mut request = self.client.post(self.url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let resp = request.send().await?;

        let status = resp.status();
        let envelope: Envelope<T> = match resp.json().await {
            Ok(envelope) => envelope,
            Err(_) => return Err(NotifyError::Api(format!("{} returned {}", method, status))),
        };
        if !envelope.ok {
            return Err(NotifyError::Api(
                envelope.description.unwrap_or_else(|| status.to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| NotifyError::Api(format!("{} returned no result", method)))
    }

    /// Send a text message
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call::<Value>(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true
            }),
            None,
        )
        .await?;
        Ok(())
    }

    /// Send a photo with caption
    pub async fn send_photo(&self, chat_id: &str, photo_url: &str, caption: &str) -> Result<()> {
        let sent = self
            .call::<Value>(
                "sendPhoto",
                json!({
                    "chat_id": chat_id,
                    "photo": photo_url,
                    "caption": caption,
                    "parse_mode": "HTML"
                }),
                None,
            )
            .await;

        if let Err(e) = sent {
            // Fallback: try sending as text only
            tracing::warn!("Failed to send photo ({}), falling back to text message", e);
            return self.send_message(chat_id, caption).await;
        }
        Ok(())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({ "offset": offset, "timeout": timeout_secs, "allowed_updates": ["message"] }),
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }

    /// Check the token.
    pub async fn get_me(&self) -> Result<Value> {
        self.call("getMe", json!({}), None).await
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
