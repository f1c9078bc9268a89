use std::time::Duration;

use model::{Metainfo, TorrentParams, TorrentRecord};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Connection settings shared by all clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Full endpoint URL; overrides `host` and `port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub enabled: bool,
}

impl RpcSettings {
    /// Endpoint URL, built from host and port unless `url` is set.
    pub fn endpoint(&self, default_port: u16, path: &str) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "http://{}:{}{}",
            self.host.as_deref().unwrap_or("localhost"),
            self.port.unwrap_or(default_port),
            path
        )
    }
}

/// HTTP client for a local daemon: never proxied, fixed timeouts.
pub(crate) fn build_client(cookie_store: bool) -> Result<Client> {
    Client::builder()
        .cookie_store(cookie_store)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| RpcError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Raw bytes and parsed metainfo of a torrent about to be added.
pub(crate) fn payload(torrent: &TorrentRecord) -> Result<(&[u8], Metainfo)> {
    let raw = torrent
        .raw
        .as_deref()
        .ok_or_else(|| RpcError::InvalidTorrent(format!("{} has no payload", torrent.hash)))?;
    let metainfo = match &torrent.metainfo {
        Some(m) => m.clone(),
        None => Metainfo::from_bytes(raw).map_err(|e| RpcError::InvalidTorrent(e.to_string()))?,
    };
    Ok((raw, metainfo))
}

/// Indices (in metainfo order) of files the old torrent had excluded.
pub fn excluded_indices(metainfo: &Metainfo, params: Option<&TorrentParams>) -> Vec<usize> {
    let Some(params) = params else {
        return Vec::new();
    };
    metainfo
        .files
        .iter()
        .enumerate()
        .filter(|(_, file)| params.is_excluded(&file.path))
        .map(|(index, _)| index)
        .collect()
}
