use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-file settings carried from an outdated torrent to its replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileParams {
    #[serde(default)]
    pub exclude: bool,
    #[serde(default)]
    pub priority: i64,
}

/// Client-side parameters of a torrent, keyed by file path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentParams {
    #[serde(default)]
    pub files: BTreeMap<String, FileParams>,
}

impl TorrentParams {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.files.get(path).is_some_and(|f| f.exclude)
    }
}

/// A torrent as reported by a torrent client, with field names normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTorrent {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub download_to: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub params: TorrentParams,
}
