//! Parsing of `.torrent` (metainfo) payloads.
//!
//! Only the parts needed to identify a torrent and map its files are decoded:
//! the info-hash, the display name, the comment and the ordered file list.

use serde::Deserialize;
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use crate::error::{MetainfoError, Result};

/// A single file entry as listed in the metainfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetainfoFile {
    /// Path as torrent clients report it: `name` for single-file torrents,
    /// `name/dir/file` for multi-file torrents.
    pub path: String,
    pub length: u64,
}

/// Decoded torrent metainfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    /// Lower-case hex SHA-1 of the bencoded `info` dictionary.
    pub info_hash: String,
    pub name: String,
    pub comment: Option<String>,
    /// Files in metainfo order. Clients address files by this index.
    pub files: Vec<MetainfoFile>,
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    info: RawInfo,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: u64,
    path: Vec<String>,
}

impl Metainfo {
    /// Parse raw `.torrent` bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let info_hash = info_hash(raw)?;

        let torrent: RawTorrent = serde_bencode::from_bytes(raw)
            .map_err(|e| MetainfoError::Malformed(e.to_string()))?;

        let files = match torrent.info.files {
            Some(files) => files
                .into_iter()
                .map(|file| {
                    let mut parts = Vec::with_capacity(file.path.len() + 1);
                    parts.push(torrent.info.name.as_str());
                    parts.extend(file.path.iter().map(String::as_str));
                    MetainfoFile {
                        path: parts.join("/"),
                        length: file.length,
                    }
                })
                .collect(),
            None => vec![MetainfoFile {
                path: torrent.info.name.clone(),
                length: torrent.info.length.unwrap_or_default(),
            }],
        };

        Ok(Self {
            info_hash,
            name: torrent.info.name,
            comment: torrent.comment.filter(|c| !c.is_empty()),
            files,
        })
    }

    /// Position of a file (by client path) in the metainfo file list.
    pub fn file_index(&self, path: &str) -> Option<usize> {
        self.files.iter().position(|f| f.path == path)
    }

    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }
}

/// Compute the info-hash of raw `.torrent` bytes.
///
/// The `info` dictionary is re-encoded canonically (sorted keys) before hashing,
/// which matches the bytes of any well-formed torrent.
pub fn info_hash(raw: &[u8]) -> Result<String> {
    let document: Value =
        serde_bencode::from_bytes(raw).map_err(|e| MetainfoError::Malformed(e.to_string()))?;

    let Value::Dict(root) = document else {
        return Err(MetainfoError::Malformed("top level is not a dictionary".into()));
    };

    let info = root
        .get(b"info".as_slice())
        .ok_or(MetainfoError::MissingInfo)?;

    let encoded =
        serde_bencode::to_bytes(info).map_err(|e| MetainfoError::Malformed(e.to_string()))?;

    Ok(hex::encode(Sha1::digest(&encoded)))
}

/// Build a minimal valid torrent in memory.
///
/// `files` holds `(relative path, length)` pairs; a single entry with an empty
/// path produces a single-file torrent named `name`.
#[cfg(any(test, feature = "test-utils"))]
pub fn build_torrent(name: &str, files: &[(&str, u64)], comment: Option<&str>) -> Vec<u8> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct File {
        length: u64,
        path: Vec<String>,
    }

    #[derive(Serialize)]
    struct Info {
        #[serde(skip_serializing_if = "Option::is_none")]
        files: Option<Vec<File>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        length: Option<u64>,
        name: String,
        #[serde(rename = "piece length")]
        piece_length: u64,
        #[serde(with = "serde_bytes")]
        pieces: Vec<u8>,
    }

    #[derive(Serialize)]
    struct Torrent {
        announce: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        info: Info,
    }

    let single = files.len() == 1 && files[0].0.is_empty();
    let info = Info {
        files: (!single).then(|| {
            files
                .iter()
                .map(|(path, length)| File {
                    length: *length,
                    path: path.split('/').map(str::to_string).collect(),
                })
                .collect()
        }),
        length: single.then(|| files[0].1),
        name: name.to_string(),
        piece_length: 16384,
        pieces: vec![0u8; 20],
    };

    let torrent = Torrent {
        announce: "http://announce.example/announce".to_string(),
        comment: comment.map(str::to_string),
        info,
    };

    serde_bencode::to_bytes(&torrent).expect("test torrent must encode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_torrent() {
        let raw = build_torrent("movie.mkv", &[("", 1024)], Some("https://rutor.org/torrent/1"));
        let meta = Metainfo::from_bytes(&raw).unwrap();

        assert_eq!(meta.name, "movie.mkv");
        assert_eq!(meta.comment.as_deref(), Some("https://rutor.org/torrent/1"));
        assert_eq!(meta.files.len(), 1);
        assert_eq!(meta.files[0].path, "movie.mkv");
        assert_eq!(meta.total_length(), 1024);
    }

    #[test]
    fn test_multi_file_paths_keep_order() {
        let raw = build_torrent("Show", &[("s01/e02.mkv", 2), ("s01/e01.mkv", 1)], None);
        let meta = Metainfo::from_bytes(&raw).unwrap();

        let paths: Vec<_> = meta.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["Show/s01/e02.mkv", "Show/s01/e01.mkv"]);
        assert_eq!(meta.file_index("Show/s01/e01.mkv"), Some(1));
        assert_eq!(meta.comment, None);
    }

    #[test]
    fn test_info_hash_is_lower_hex_and_ignores_outer_fields() {
        let a = build_torrent("same", &[("", 10)], Some("first"));
        let b = build_torrent("same", &[("", 10)], Some("second"));
        let c = build_torrent("other", &[("", 10)], Some("first"));

        let hash_a = info_hash(&a).unwrap();
        assert_eq!(hash_a.len(), 40);
        assert!(hash_a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash_a, info_hash(&b).unwrap());
        assert_ne!(hash_a, info_hash(&c).unwrap());
    }

    #[test]
    fn test_info_hash_matches_sha1_of_info_bytes() {
        // Hand-encoded torrent with info keys already sorted.
        let info = b"d6:lengthi5e4:name1:a12:piece lengthi1e6:pieces0:e";
        let mut raw = b"d4:info".to_vec();
        raw.extend_from_slice(info);
        raw.push(b'e');

        assert_eq!(info_hash(&raw).unwrap(), hex::encode(Sha1::digest(info)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            Metainfo::from_bytes(b"<html>login</html>"),
            Err(MetainfoError::Malformed(_))
        ));
        assert!(matches!(info_hash(b"d3:fooi1ee"), Err(MetainfoError::MissingInfo)));
    }
}
