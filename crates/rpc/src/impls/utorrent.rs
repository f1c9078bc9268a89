use std::sync::Arc;

use async_trait::async_trait;
use model::{from_settings, to_settings, ClientTorrent, PluginSettings, TorrentParams, TorrentRecord};
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::settings::{build_client, excluded_indices, payload, RpcSettings};
use crate::traits::Rpc;

// Positions inside a `list=1` torrent row.
const HASH: usize = 0;
const NAME: usize = 2;
const DOWNLOAD_DIR: usize = 26;

#[derive(Debug, Deserialize)]
struct TorrentList {
    #[serde(default)]
    torrents: Vec<Vec<Value>>,
}

fn parse_token(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div#token")
        .map_err(|e| RpcError::Protocol(format!("token selector: {}", e)))?;
    document
        .select(&selector)
        .next()
        .map(|div| div.text().collect::<String>().trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RpcError::Auth("no token in token.html".into()))
}

fn row_str(row: &[Value], index: usize) -> Option<&str> {
    row.get(index).and_then(Value::as_str)
}

/// uTorrent WebUI client. Every request carries a CSRF token bound to the
/// `GUID` cookie; a 400 answer means the token went stale.
pub struct UTorrent {
    settings: RpcSettings,
    base_url: String,
    client: Client,
    token: Mutex<Option<String>>,
}

impl UTorrent {
    pub const ALIAS: &'static str = "utorrent";

    pub fn new(settings: RpcSettings) -> Result<Self> {
        let base_url = settings.endpoint(8080, "/gui/");
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self {
            settings,
            base_url,
            client: build_client(true)?,
            token: Mutex::new(None),
        })
    }

    pub fn spawn(settings: &PluginSettings) -> Result<Arc<dyn Rpc>> {
        let settings = from_settings(Self::ALIAS, settings).map_err(|e| RpcError::Config(e.to_string()))?;
        Ok(Arc::new(Self::new(settings)?))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.user {
            Some(user) => request.basic_auth(user, self.settings.password.as_ref()),
            None => request,
        }
    }

    /// GET /gui/token.html
    async fn refresh_token(&self) -> Result<String> {
        tracing::debug!("Requesting uTorrent token ...");
        let response = self
            .authorize(self.client.get(format!("{}token.html", self.base_url)))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RpcError::Auth("invalid username or password".into()));
        }
        let token = parse_token(&response.error_for_status()?.text().await?)?;
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    async fn current_token(&self) -> Result<String> {
        let token = self.token.lock().clone();
        match token {
            Some(token) => Ok(token),
            None => self.refresh_token().await,
        }
    }

    fn gui(&self, method: Method, token: &str) -> RequestBuilder {
        self.client
            .request(method, &self.base_url)
            .query(&[("token", token)])
    }

    /// Send a request built by `build` for the current token. A 400 means the
    /// token expired: fetch a new one and resend once.
    async fn call<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.current_token().await?;
        let mut response = self.authorize(build(&token)).send().await?;
        if response.status() == StatusCode::BAD_REQUEST {
            tracing::debug!("uTorrent token expired, requesting a new one");
            let token = self.refresh_token().await?;
            response = self.authorize(build(&token)).send().await?;
        }

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(RpcError::Auth(format!("uTorrent rejected the request: {}", status)));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcError::Api {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn action(&self, action: &str, hash: &str) -> Result<()> {
        self.call(|token| {
            self.gui(Method::GET, token)
                .query(&[("action", action), ("hash", hash)])
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Rpc for UTorrent {
    fn alias(&self) -> &str {
        Self::ALIAS
    }

    fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// GET /gui/?list=1
    ///
    /// The list carries no comment and no per-file settings.
    async fn list_torrents(&self, hashes: Option<&[String]>) -> Result<Vec<ClientTorrent>> {
        let list: TorrentList = self
            .call(|token| self.gui(Method::GET, token).query(&[("list", "1")]))
            .await?
            .json()
            .await?;

        let torrents = list
            .torrents
            .iter()
            .filter_map(|row| {
                let hash = row_str(row, HASH)?.to_lowercase();
                Some(ClientTorrent {
                    name: row_str(row, NAME).unwrap_or_default().to_string(),
                    download_to: row_str(row, DOWNLOAD_DIR).map(str::to_string),
                    hash,
                    ..Default::default()
                })
            })
            .filter(|torrent| {
                hashes.map_or(true, |wanted| {
                    wanted.iter().any(|h| h.eq_ignore_ascii_case(&torrent.hash))
                })
            })
            .collect();
        Ok(torrents)
    }

    /// POST /gui/?action=add-file, then GET /gui/?action=setprio for exclusions.
    async fn add_torrent(
        &self,
        torrent: &TorrentRecord,
        download_to: Option<&str>,
        params: Option<&TorrentParams>,
    ) -> Result<()> {
        let (raw, metainfo) = payload(torrent)?;
        let response = self
            .call(|token| {
                let mut request = self
                    .gui(Method::POST, token)
                    .query(&[("action", "add-file")]);
                if let Some(dir) = download_to {
                    request = request.query(&[("path", dir)]);
                }
                let part = Part::bytes(raw.to_vec()).file_name("file.torrent");
                request.multipart(Form::new().part("torrent_file", part))
            })
            .await?;
        let reply: Value = response.json().await.unwrap_or_default();
        if let Some(error) = reply.get("error").and_then(Value::as_str) {
            return Err(RpcError::InvalidTorrent(error.to_string()));
        }

        let excluded = excluded_indices(&metainfo, params);
        if !excluded.is_empty() {
            let mut query = vec![
                ("action", "setprio".to_string()),
                ("hash", metainfo.info_hash.to_uppercase()),
                ("p", "0".to_string()),
            ];
            query.extend(excluded.iter().map(|i| ("f", i.to_string())));
            self.call(|token| self.gui(Method::GET, token).query(&query))
                .await?;
        }
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()> {
        let action = if with_data { "removedata" } else { "remove" };
        self.action(action, hash).await
    }

    /// GET /gui/?action=getversion
    async fn version(&self) -> Result<String> {
        let reply: Value = self
            .call(|token| {
                self.gui(Method::GET, token)
                    .query(&[("action", "getversion")])
            })
            .await?
            .json()
            .await?;
        match reply.pointer("/version/ui_version") {
            Some(Value::String(version)) => Ok(version.clone()),
            Some(other) => Ok(other.to_string()),
            None => Ok(reply
                .get("build")
                .map(Value::to_string)
                .unwrap_or_else(|| "unknown".to_string())),
        }
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings)
    }
}
