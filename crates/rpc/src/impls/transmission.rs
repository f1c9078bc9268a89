use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use model::{
    from_settings, to_settings, ClientTorrent, FileParams, PluginSettings, TorrentParams,
    TorrentRecord,
};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, RpcError};
use crate::settings::{build_client, excluded_indices, payload, RpcSettings};
use crate::traits::Rpc;

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Deserialize)]
struct Envelope {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FileStat {
    wanted: bool,
    #[serde(default)]
    priority: i64,
}

/// Transmission JSON-RPC client.
///
/// The daemon answers 409 with a fresh session id when ours is missing or
/// stale; the request is repeated once with the new id.
pub struct Transmission {
    settings: RpcSettings,
    url: String,
    client: Client,
    session_id: Mutex<String>,
}

impl Transmission {
    pub const ALIAS: &'static str = "transmission";

    pub fn new(settings: RpcSettings) -> Result<Self> {
        let url = settings.endpoint(9091, "/transmission/rpc");
        Ok(Self {
            settings,
            url,
            client: build_client(false)?,
            session_id: Mutex::new(String::new()),
        })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Rpc>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| RpcError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let session_id = self.session_id.lock().clone();
        let mut request = self
            .client
            .post(&self.url)
            .header(SESSION_HEADER, session_id)
            .json(body);
        if let Some(user) = &self.settings.user {
            request = request.basic_auth(user, self.settings.password.as_ref());
        }
        Ok(request.send().await?)
    }

    async fn query(&self, method: &str, arguments: Value) -> Result<Value> {
        tracing::debug!("RPC method `{}` ...", method);
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.send(&body).await?;
        if response.status() == StatusCode::CONFLICT {
            let session_id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RpcError::Protocol("409 without a session id".into()))?;
            *self.session_id.lock() = session_id.to_string();
            tracing::debug!("Transmission session id refreshed");

            response = self.send(&body).await?;
            if response.status() == StatusCode::CONFLICT {
                return Err(RpcError::Auth("session id rejected twice".into()));
            }
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RpcError::Auth("invalid username or password".into()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope = response.json().await?;
        if envelope.result != "success" {
            return Err(RpcError::Protocol(envelope.result));
        }
        Ok(envelope.arguments)
    }

    fn to_client_torrent(&self, raw: Value) -> Result<ClientTorrent> {
        let Value::Object(raw) = raw else {
            return Err(RpcError::Protocol("torrent is not an object".into()));
        };
        let raw = self.normalize_fields(raw);

        let files: Vec<TorrentFile> =
            serde_json::from_value(raw.get("files").cloned().unwrap_or_default()).unwrap_or_default();
        let stats: Vec<FileStat> = serde_json::from_value(raw.get("fileStats").cloned().unwrap_or_default())
            .unwrap_or_default();

        let mut torrent: ClientTorrent = serde_json::from_value(Value::Object(raw))?;
        torrent.params = TorrentParams {
            files: files
                .into_iter()
                .zip(stats)
                .map(|(file, stat)| {
                    (
                        file.name,
                        FileParams {
                            exclude: !stat.wanted,
                            priority: stat.priority,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        };
        Ok(torrent)
    }
}

#[async_trait]
impl Rpc for Transmission {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    fn enabled(&self) -> bool {
        self.settings.enabled
    }

    fn fields_map(&self) -> &'static [(&'static str, &'static str)] {
        &[("hashString", "hash"), ("downloadDir", "download_to")]
    }

    async fn list_torrents(&self, hashes: Option<&[String]>) -> Result<Vec<ClientTorrent>> {
        let mut arguments = json!({
            "fields": ["id", "name", "hashString", "comment", "downloadDir", "files", "fileStats"],
        });
        if let Some(hashes) = hashes {
            arguments["ids"] = json!(hashes);
        }

        let result = self.query("torrent-get", arguments).await?;
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

        let mut arguments = json!({ "metainfo": STANDARD.encode(raw) });
        if let Some(dir) = download_to {
            arguments["download-dir"] = json!(dir);
        }
        let unwanted = excluded_indices(&metainfo, params);
        if !unwanted.is_empty() {
            arguments["files-unwanted"] = json!(unwanted);
        }

        self.query("torrent-add", arguments).await?;
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()> {
        self.query(
            "torrent-remove",
            json!({ "ids": [hash], "delete-local-data": with_data }),
        )
        .await?;
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let result = self.query("session-get", json!({})).await?;
        match (result.get("version"), result.get("rpc-version")) {
            (Some(Value::String(version)), _) => Ok(version.clone()),
            (_, Some(rpc_version)) => Ok(rpc_version.to_string()),
            _ => Err(RpcError::Protocol("session-get without version".into())),
        }
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}
