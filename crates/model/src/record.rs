use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metainfo::Metainfo;

/// Display metadata scraped from a tracker page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<String>,
}

impl PageData {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.cover.is_empty() && self.date_updated.is_none()
    }
}

/// A tracked torrent, keyed by its info-hash.
///
/// Raw bytes and the parsed metainfo are transient: they travel from a tracker
/// to an RPC adapter within one run and are never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    /// Tracker page the torrent was published on.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Direct download link resolved on the last fetch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageData>,
    #[serde(skip)]
    pub raw: Option<Vec<u8>>,
    #[serde(skip)]
    pub metainfo: Option<Metainfo>,
}

impl TorrentRecord {
    /// Record for a torrent known only by hash (e.g. registered by hand).
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into().to_lowercase(),
            ..Default::default()
        }
    }

    /// Build a record from downloaded `.torrent` bytes.
    pub fn from_raw(raw: Vec<u8>) -> Result<Self> {
        Self::default().with_raw(raw)
    }

    /// Attach raw bytes. The hash and name derived from them win over whatever
    /// the record held before.
    pub fn with_raw(mut self, raw: Vec<u8>) -> Result<Self> {
        let metainfo = Metainfo::from_bytes(&raw)?;
        self.hash = metainfo.info_hash.clone();
        if self.name.is_empty() {
            self.name = metainfo.name.clone();
        }
        self.raw = Some(raw);
        self.metainfo = Some(metainfo);
        Ok(self)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Copy of this record without the transient payload, as it is persisted.
    pub fn stored(&self) -> Self {
        Self {
            raw: None,
            metainfo: None,
            ..self.clone()
        }
    }

    /// Name for messages: the record name, the page title, or the hash.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        match &self.page {
            Some(page) if !page.title.is_empty() => &page.title,
            _ => &self.hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::build_torrent;

    #[test]
    fn test_raw_hash_wins_over_supplied() {
        let raw = build_torrent("payload", &[("", 3)], None);
        let record = TorrentRecord::new("DEADBEEF").with_raw(raw.clone()).unwrap();

        assert_eq!(record.hash, crate::metainfo::info_hash(&raw).unwrap());
        assert_eq!(record.name, "payload");
        assert!(record.metainfo.is_some());
    }

    #[test]
    fn test_explicit_name_is_kept() {
        let raw = build_torrent("payload", &[("", 3)], None);
        let record = TorrentRecord::default()
            .with_name("My show")
            .with_raw(raw)
            .unwrap();

        assert_eq!(record.name, "My show");
    }

    #[test]
    fn test_stored_drops_payload() {
        let raw = build_torrent("payload", &[("", 3)], None);
        let record = TorrentRecord::from_raw(raw)
            .unwrap()
            .with_url("https://rutor.org/torrent/5");
        let stored = record.stored();

        assert!(stored.raw.is_none());
        assert!(stored.metainfo.is_none());
        assert_eq!(stored.url, record.url);

        let json = serde_json::to_value(&stored).unwrap();
        assert!(json.get("raw").is_none());
        assert!(json.get("url_file").is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut record = TorrentRecord::new("abc");
        assert_eq!(record.display_name(), "abc");

        record.page = Some(PageData {
            title: "Title".into(),
            ..Default::default()
        });
        assert_eq!(record.display_name(), "Title");
    }
}
