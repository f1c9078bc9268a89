//! Shared data model: torrent records, metainfo parsing, client views and
//! plugin settings.

mod client;
mod error;
pub mod metainfo;
mod record;
mod settings;
mod text;

pub use client::{ClientTorrent, FileParams, TorrentParams};
pub use error::{MetainfoError, Result, SettingsError};
pub use metainfo::{info_hash, Metainfo, MetainfoFile};
pub use record::{PageData, TorrentRecord};
pub use settings::{from_settings, parse_pairs, to_settings, PluginSettings};
pub use text::find_url;
