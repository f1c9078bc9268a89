use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use model::{
    from_settings, to_settings, ClientTorrent, FileParams, PluginSettings, TorrentParams,
    TorrentRecord,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, RpcError};
use crate::settings::{build_client, excluded_indices, payload, RpcSettings};
use crate::traits::Rpc;

/// filePrio attempts while a just-added torrent is not yet known (404) or has no
/// metadata (409).
const FILE_PRIO_ATTEMPTS: usize = 3;
const FILE_PRIO_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    name: String,
    #[serde(default)]
    priority: i64,
}

/// qBittorrent WebUI API v2 client with a cookie session.
pub struct QBittorrent {
    settings: RpcSettings,
    base_url: String,
    client: Client,
    logged_in: AtomicBool,
}

impl QBittorrent {
    pub const ALIAS: &'static str = "qbittorrent";

    pub fn new(settings: RpcSettings) -> Result<Self> {
        let base_url = settings.endpoint(8080, "/").trim_end_matches('/').to_string();
        Ok(Self {
            settings,
            base_url,
            client: build_client(true)?,
            logged_in: AtomicBool::new(false),
        })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Rpc>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| RpcError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.base_url, path)
    }

    /// Login to qBittorrent WebUI
    /// POST /api/v2/auth/login
    async fn login(&self) -> Result<()> {
        let params = [
            ("username", self.settings.user.as_deref().unwrap_or_default()),
            ("password", self.settings.password.as_deref().unwrap_or_default()),
        ];
        let response = self
            .client
            .post(self.url("/auth/login"))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() && body == "Ok." {
            tracing::debug!("Successfully logged in to qBittorrent");
            self.logged_in.store(true, Ordering::SeqCst);
            Ok(())
        } else if body == "Fails." {
            Err(RpcError::Auth("Invalid username or password".into()))
        } else {
            Err(RpcError::Auth(format!("Login failed: {} - {}", status.as_u16(), body)))
        }
    }

    /// Send a request built by `build`, logging in first if needed. A 403 means
    /// the session expired: log in again and resend once.
    async fn call<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login().await?;
        }

        let mut response = build(&self.client).send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            tracing::debug!("qBittorrent session expired, logging in again");
            self.logged_in.store(false, Ordering::SeqCst);
            self.login().await?;
            response = build(&self.client).send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcError::Api {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// GET /api/v2/torrents/properties
    async fn comment(&self, hash: &str) -> Result<String> {
        let url = self.url("/torrents/properties");
        let properties: Properties = self
            .call(|c| c.get(&url).query(&[("hash", hash)]))
            .await?
            .json()
            .await?;
        Ok(properties.comment)
    }

    /// POST /api/v2/torrents/filePrio with priority 0 for `indices`.
    async fn exclude_files(&self, hash: &str, indices: &[usize]) -> Result<()> {
        let url = self.url("/torrents/filePrio");
        let ids = indices
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join("|");

        let mut attempt = 1;
        loop {
            let result = self
                .call(|c| {
                    c.post(&url)
                        .form(&[("hash", hash), ("id", ids.as_str()), ("priority", "0")])
                })
                .await;
            match result {
                Err(RpcError::Api {
                    status_code: 404 | 409,
                    ..
                }) if attempt < FILE_PRIO_ATTEMPTS => {
                    tracing::debug!("Torrent {} is not ready for filePrio yet, retrying", hash);
                    attempt += 1;
                    tokio::time::sleep(FILE_PRIO_DELAY).await;
                }
                result => return result.map(|_| ()),
            }
        }
    }

    /// GET /api/v2/torrents/files
    async fn files(&self, hash: &str) -> Result<TorrentParams> {
        let url = self.url("/torrents/files");
        let files: Vec<TorrentFile> = self
            .call(|c| c.get(&url).query(&[("hash", hash)]))
            .await?
            .json()
            .await?;
        Ok(TorrentParams {
            files: files
                .into_iter()
                .map(|f| {
                    (
                        f.name,
                        FileParams {
                            exclude: f.priority == 0,
                            priority: f.priority,
                        },
                    )
                })
                .collect(),
        })
    }
}

#[async_trait]
impl Rpc for QBittorrent {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    fn enabled(&self) -> bool {
        self.settings.enabled
    }

    fn fields_map(&self) -> &'static [(&'static str, &'static str)] {
        &[("save_path", "download_to")]
    }

    /// GET /api/v2/torrents/info, then comment and files per torrent.
    async fn list_torrents(&self, hashes: Option<&[String]>) -> Result<Vec<ClientTorrent>> {
        let url = self.url("/torrents/info");
        let filter = hashes.map(|h| h.join("|"));
        let raw: Vec<Map<String, Value>> = self
            .call(|c| {
                let request = c.get(&url);
                match &filter {
                    Some(hashes) => request.query(&[("hashes", hashes)]),
                    None => request,
                }
            })
            .await?
            .json()
            .await?;

        let mut torrents = Vec::with_capacity(raw.len());
        for info in raw {
            let mut torrent: ClientTorrent =
                serde_json::from_value(Value::Object(self.normalize_fields(info)))?;
            torrent.comment = self.comment(&torrent.hash).await?;
            torrent.params = self.files(&torrent.hash).await?;
            torrents.push(torrent);
        }
        Ok(torrents)
    }

    /// POST /api/v2/torrents/add, then POST /api/v2/torrents/filePrio for exclusions.
    async fn add_torrent(
        &self,
        torrent: &TorrentRecord,
        download_to: Option<&str>,
        params: Option<&TorrentParams>,
    ) -> Result<()> {
        let (raw, metainfo) = payload(torrent)?;
        let url = self.url("/torrents/add");

        let response = self
            .call(|c| {
                let part = Part::bytes(raw.to_vec()).file_name("file.torrent");
                let mut form = Form::new().part("torrents", part);
                if let Some(dir) = download_to {
                    form = form.text("savepath", dir.to_string());
                }
                c.post(&url).multipart(form)
            })
            .await?;
        let body = response.text().await.unwrap_or_default();
        if body.trim() == "Fails." {
            return Err(RpcError::InvalidTorrent(format!("{} was rejected", metainfo.info_hash)));
        }

        // The torrent is in the client already: a failed exclusion downloads
        // extra files but must not fail the replacement.
        let excluded = excluded_indices(&metainfo, params);
        if !excluded.is_empty() {
            if let Err(e) = self.exclude_files(&metainfo.info_hash, &excluded).await {
                tracing::warn!(
                    "Torrent {} added, but excluding files {:?} failed: {}",
                    metainfo.info_hash,
                    excluded,
                    e
                );
            }
        }
        Ok(())
    }

    /// POST /api/v2/torrents/delete
    async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()> {
        let url = self.url("/torrents/delete");
        let delete_files = if with_data { "true" } else { "false" };
        self.call(|c| {
            c.post(&url)
                .form(&[("hashes", hash), ("deleteFiles", delete_files)])
        })
        .await?;
        Ok(())
    }

    /// GET /api/v2/app/webapiVersion
    async fn version(&self) -> Result<String> {
        let url = self.url("/app/webapiVersion");
        Ok(self.call(|c| c.get(&url)).await?.text().await?)
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}
