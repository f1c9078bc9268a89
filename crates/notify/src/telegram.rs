use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use model::{from_settings, to_settings, PluginSettings, TorrentRecord};
use serde::{Deserialize, Serialize};

use crate::client::{escape_html, TelegramClient, DEFAULT_API_URL};
use crate::error::{NotifyError, Result};
use crate::Notifier;

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Telegram notifier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// Sends walk results to a Telegram chat.
pub struct TelegramNotifier {
    settings: TelegramSettings,
    client: TelegramClient,
}

impl TelegramNotifier {
    pub const ALIAS: &'static str = "telegram";

    pub fn new(settings: TelegramSettings) -> Result<Self> {
        if settings.token.is_empty() || settings.chat_id.is_empty() {
            return Err(NotifyError::Config("token and chat_id are required".into()));
        }
        let client = TelegramClient::with_token(&settings.api_url, &settings.token)?;
        Ok(Self { settings, client })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Notifier>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }
}

/// HTML body: one line per torrent, linked to its page when known.
fn render_html(updated: &BTreeMap<String, TorrentRecord>) -> String {
    let mut text = String::from("The following torrents were updated:\n");
    for record in updated.values() {
        let name = escape_html(record.display_name());
        if record.url.is_empty() {
            text.push_str(&format!("• {}\n", name));
        } else {
            text.push_str(&format!("• <a href=\"{}\">{}</a>\n", escape_html(&record.url), name));
        }
    }
    text
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        self.client
            .send_message(&self.settings.chat_id, &escape_html(text))
            .await
    }

    async fn send(&self, updated: &BTreeMap<String, TorrentRecord>) -> Result<()> {
        let text = render_html(updated);
        let cover = match updated.values().collect::<Vec<_>>().as_slice() {
            [single] => single.page.as_ref().map(|p| p.cover.clone()).filter(|c| !c.is_empty()),
            _ => None,
        };
        tracing::debug!("Sending Telegram notification for {} torrent(s)", updated.len());
        match cover {
            Some(cover) => self.client.send_photo(&self.settings.chat_id, &cover, &text).await,
            None => self.client.send_message(&self.settings.chat_id, &text).await,
        }
    }

    async fn test_configuration(&self) -> Result<bool> {
        self.client.get_me().await?;
        self.send_message("retorrent notifications are configured").await?;
        Ok(true)
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use model::PageData;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    type Sent = Arc<Mutex<Vec<(String, Value)>>>;

    async fn api(State(sent): State<Sent>, Path((_token, method)): Path<(String, String)>, Json(body): Json<Value>) -> Json<Value> {
        let ok = !(method == "sendPhoto" && body["photo"] == "https://broken/cover.jpg");
        sent.lock().push((method, body));
        if ok {
            Json(json!({ "ok": true, "result": { "message_id": 1 } }))
        } else {
            Json(json!({ "ok": false, "description": "Bad Request: wrong file identifier" }))
        }
    }

    async fn notifier() -> (TelegramNotifier, Sent) {
        let sent = Sent::default();
        let router = Router::new()
            .route("/{token}/{method}", post(api))
            .with_state(sent.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let notifier = TelegramNotifier::new(TelegramSettings {
            token: "42:abc".into(),
            chat_id: "1001".into(),
            api_url: format!("http://{}", addr),
        })
        .unwrap();
        (notifier, sent)
    }

    fn updated(cover: &str) -> BTreeMap<String, TorrentRecord> {
        let mut record = TorrentRecord::new("bbbb")
            .with_name("Show S01")
            .with_url("https://rutor.org/torrent/1");
        record.page = Some(PageData {
            cover: cover.to_string(),
            ..Default::default()
        });
        BTreeMap::from([("aaaa".to_string(), record)])
    }

    #[test]
    fn test_render_html() {
        let text = render_html(&updated(""));
        assert!(text.starts_with("The following torrents were updated:\n"));
        assert!(text.contains("<a href=\"https://rutor.org/torrent/1\">Show S01</a>"));
    }

    #[test]
    fn test_missing_token() {
        let settings = TelegramSettings {
            token: String::new(),
            chat_id: "1".into(),
            api_url: default_api_url(),
        };
        assert!(matches!(TelegramNotifier::new(settings), Err(NotifyError::Config(_))));
    }

    #[tokio::test]
    async fn test_send_text() {
        let (notifier, sent) = notifier().await;
        notifier.send(&updated("")).await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sendMessage");
        assert_eq!(sent[0].1["chat_id"], "1001");
        assert_eq!(sent[0].1["parse_mode"], "HTML");
    }

    #[tokio::test]
    async fn test_photo_falls_back_to_text() {
        let (notifier, sent) = notifier().await;
        notifier.send(&updated("https://broken/cover.jpg")).await.unwrap();

        let methods: Vec<_> = sent.lock().iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(methods, vec!["sendPhoto", "sendMessage"]);
    }
}
