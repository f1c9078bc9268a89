use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use model::{
    from_settings, to_settings, ClientTorrent, FileParams, PluginSettings, TorrentParams,
    TorrentRecord,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, RpcError};
use crate::settings::{build_client, excluded_indices, payload, RpcSettings};
use crate::traits::Rpc;

/// Error code the WebUI uses for calls without a valid session.
const NOT_AUTHENTICATED: i64 = 1;

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct DelugeFile {
    path: String,
    index: usize,
}

/// Deluge WebUI JSON-RPC client. Requires the `webapi` plugin.
pub struct Deluge {
    settings: RpcSettings,
    url: String,
    client: Client,
    logged_in: AtomicBool,
}

impl Deluge {
    pub const ALIAS: &'static str = "deluge";

    pub fn new(settings: RpcSettings) -> Result<Self> {
        let url = settings.endpoint(8112, "/json");
        Ok(Self {
            settings,
            url,
            client: build_client(true)?,
            logged_in: AtomicBool::new(false),
        })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Rpc>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| RpcError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    async fn send(&self, method: &str, params: &Value) -> Result<Reply> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "id": 1, "method": method, "params": params }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcError::Api {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn login(&self) -> Result<()> {
        tracing::debug!("Logging in to Deluge ...");
        let password = self.settings.password.clone().unwrap_or_default();
        let reply = self.send("auth.login", &json!([password])).await?;
        if reply.result != Value::Bool(true) {
            return Err(RpcError::Auth("Deluge rejected the password".into()));
        }
        self.logged_in.store(true, Ordering::SeqCst);

        let connected = self.send("auth.check_session", &json!([])).await?;
        if connected.result != Value::Bool(true) {
            return Err(RpcError::Protocol("Deluge WebUI is not connected to a daemon".into()));
        }
        Ok(())
    }

    /// Call a method, logging in lazily. A "not authenticated" reply triggers
    /// one fresh login and a single resend.
    async fn query(&self, method: &str, params: Value) -> Result<Value> {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login().await?;
        }
        tracing::debug!("RPC method `{}` ...", method);

        let mut reply = self.send(method, &params).await?;
        if reply.error.as_ref().is_some_and(|e| e.code == NOT_AUTHENTICATED) {
            self.logged_in.store(false, Ordering::SeqCst);
            self.login().await?;
            reply = self.send(method, &params).await?;
        }

        match reply.error {
            Some(e) if e.code == NOT_AUTHENTICATED => Err(RpcError::Auth(e.message)),
            Some(e) => Err(RpcError::Protocol(e.message)),
            None => Ok(reply.result),
        }
    }

    fn to_client_torrent(&self, raw: Value) -> Result<ClientTorrent> {
        let Value::Object(raw) = raw else {
            return Err(RpcError::Protocol("torrent is not an object".into()));
        };
        let raw = self.normalize_fields(raw);

        let files: Vec<DelugeFile> =
            serde_json::from_value(raw.get("files").cloned().unwrap_or_default()).unwrap_or_default();
        let priorities: Vec<i64> =
            serde_json::from_value(raw.get("file_priorities").cloned().unwrap_or_default())
                .unwrap_or_default();

        let mut torrent: ClientTorrent = serde_json::from_value(Value::Object(raw))?;
        torrent.params = TorrentParams {
            files: files
                .into_iter()
                .map(|file| {
                    let priority = priorities.get(file.index).copied().unwrap_or(1);
                    (
                        file.path,
                        FileParams {
                            exclude: priority == 0,
                            priority,
                        },
                    )
                })
                .collect(),
        };
        Ok(torrent)
    }
}

#[async_trait]
impl Rpc for Deluge {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    fn enabled(&self) -> bool {
        self.settings.enabled
    }

    fn fields_map(&self) -> &'static [(&'static str, &'static str)] {
        &[("save_path", "download_to")]
    }

    async fn list_torrents(&self, hashes: Option<&[String]>) -> Result<Vec<ClientTorrent>> {
        let fields = ["name", "comment", "hash", "save_path", "files", "file_priorities"];
        let result = self
            .query("webapi.get_torrents", json!([hashes, fields]))
            .await?;
        let torrents = match result.get("torrents") {
            Some(Value::Array(torrents)) => torrents.clone(),
            _ => Vec::new(),
        };
        torrents
            .into_iter()
            .map(|raw| self.to_client_torrent(raw))
            .collect()
    }

    async fn add_torrent(
        &self,
        torrent: &TorrentRecord,
        download_to: Option<&str>,
        params: Option<&TorrentParams>,
    ) -> Result<()> {
        let (raw, metainfo) = payload(torrent)?;

        let mut options = json!({});
        if let Some(dir) = download_to {
            options["download_location"] = json!(dir);
        }
        let excluded = excluded_indices(&metainfo, params);
        if !excluded.is_empty() {
            let priorities: Vec<i64> = (0..metainfo.files.len())
                .map(|i| if excluded.contains(&i) { 0 } else { 1 })
                .collect();
            options["file_priorities"] = json!(priorities);
        }

        self.query("webapi.add_torrent", json!([STANDARD.encode(raw), options]))
            .await?;
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()> {
        self.query("webapi.remove_torrent", json!([hash, with_data]))
            .await?;
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        match self.query("webapi.get_api_version", json!([])).await? {
            Value::String(version) => Ok(version),
            other => Ok(other.to_string()),
        }
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use model::metainfo::build_torrent;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct WebUi {
        logins: Arc<AtomicUsize>,
        /// Calls to answer with "not authenticated" before accepting.
        expire: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<Value>>>,
    }

    async fn json_rpc(State(ui): State<WebUi>, Json(body): Json<Value>) -> Json<Value> {
        let method = body["method"].as_str().unwrap_or_default().to_string();
        let result = match method.as_str() {
            "auth.login" => {
                ui.logins.fetch_add(1, Ordering::SeqCst);
                json!(body["params"][0] == "deluge")
            }
            "auth.check_session" => json!(true),
            _ => {
                if ui
                    .expire
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Json(json!({
                        "id": 1, "result": null,
                        "error": { "message": "Not authenticated", "code": 1 }
                    }));
                }
                ui.calls.lock().push(body.clone());
                match method.as_str() {
                    "webapi.get_torrents" => json!({ "torrents": [{
                        "hash": "cccc",
                        "name": "Album",
                        "comment": "",
                        "save_path": "/data/music",
                        "files": [{ "path": "Album/01.flac", "index": 0 }, { "path": "Album/cover.jpg", "index": 1 }],
                        "file_priorities": [1, 0]
                    }]}),
                    "webapi.get_api_version" => json!("0.2.1"),
                    _ => json!(true),
                }
            }
        };
        Json(json!({ "id": 1, "result": result, "error": null }))
    }

    async fn client(ui: WebUi, password: &str) -> Deluge {
        let base = serve(Router::new().route("/json", post(json_rpc)).with_state(ui)).await;
        Deluge::new(RpcSettings {
            url: Some(format!("{}/json", base)),
            password: Some(password.into()),
            enabled: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_torrents() {
        let rpc = client(WebUi::default(), "deluge").await;
        let torrents = rpc.list_torrents(Some(&["cccc".to_string()])).await.unwrap();

        assert_eq!(torrents[0].download_to.as_deref(), Some("/data/music"));
        assert!(torrents[0].params.is_excluded("Album/cover.jpg"));
        assert!(!torrents[0].params.is_excluded("Album/01.flac"));
    }

    #[tokio::test]
    async fn test_bad_password() {
        let rpc = client(WebUi::default(), "wrong").await;
        assert!(rpc.version().await.unwrap_err().is_auth_error());
    }

    #[tokio::test]
    async fn test_expired_session_relogs_once() {
        let ui = WebUi::default();
        ui.expire.store(1, Ordering::SeqCst);
        let rpc = client(ui.clone(), "deluge").await;

        assert_eq!(rpc.version().await.unwrap(), "0.2.1");
        assert_eq!(ui.logins.load(Ordering::SeqCst), 2);

        ui.expire.store(2, Ordering::SeqCst);
        assert!(rpc.version().await.unwrap_err().is_auth_error());
    }

    #[tokio::test]
    async fn test_add_torrent_priorities() {
        let ui = WebUi::default();
        let rpc = client(ui.clone(), "deluge").await;

        let raw = build_torrent("Album", &[("cover.jpg", 1), ("01.flac", 2)], None);
        let record = TorrentRecord::from_raw(raw).unwrap();
        let mut params = TorrentParams::default();
        params.files.insert("Album/cover.jpg".into(), FileParams { exclude: true, priority: 0 });

        rpc.add_torrent(&record, Some("/data/music"), Some(&params)).await.unwrap();

        let calls = ui.calls.lock();
        let add = calls.iter().find(|c| c["method"] == "webapi.add_torrent").unwrap();
        assert_eq!(add["params"][1]["download_location"], "/data/music");
        assert_eq!(add["params"][1]["file_priorities"], json!([0, 1]));
    }
}
