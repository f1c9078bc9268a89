use async_trait::async_trait;
use model::{ClientTorrent, PluginSettings, TorrentParams, TorrentRecord};
use serde_json::{Map, Value};

use crate::error::Result;

/// Torrent client RPC trait
///
/// Implementations hide the client's wire protocol and session handling.
/// Every call logs in lazily and retries exactly once when the client reports
/// a stale session.
#[async_trait]
pub trait Rpc: Send + Sync {
    fn alias(&self) -> &str;

    fn enabled(&self) -> bool;

    /// Protocol field name to common field name.
    fn fields_map(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Copy protocol specific fields of a torrent object under their common names.
    fn normalize_fields(&self, mut raw: Map<String, Value>) -> Map<String, Value> {
        for (from, to) in self.fields_map() {
            if let Some(value) = raw.get(*from).cloned() {
                raw.insert((*to).to_string(), value);
            }
        }
        raw
    }

    /// List torrents known to the client.
    ///
    /// # Arguments
    /// * `hashes` - Restrict to these info-hashes; `None` lists everything
    async fn list_torrents(&self, hashes: Option<&[String]>) -> Result<Vec<ClientTorrent>>;

    /// Add a torrent from its raw payload.
    ///
    /// # Arguments
    /// * `torrent` - Record carrying raw `.torrent` bytes
    /// * `download_to` - Target directory; client default when `None`
    /// * `params` - Per-file settings to apply (exclusions are mapped by path)
    async fn add_torrent(
        &self,
        torrent: &TorrentRecord,
        download_to: Option<&str>,
        params: Option<&TorrentParams>,
    ) -> Result<()>;

    async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()>;

    /// Client or API version.
    async fn version(&self) -> Result<String>;

    /// Check connectivity and credentials.
    async fn test_configuration(&self) -> Result<bool> {
        let version = self.version().await?;
        tracing::debug!("{} version: {}", self.alias(), version);
        Ok(true)
    }

    fn to_settings(&self) -> PluginSettings;
}
