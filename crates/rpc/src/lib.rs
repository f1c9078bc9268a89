//! Torrent client RPC: one trait, one implementation per client.
//!
//! ```rust,ignore
//! let class = rpc::classes().into_iter().find(|c| c.alias == "transmission").unwrap();
//! let client = (class.spawn)(&settings)?;
//! for torrent in client.list_torrents(None).await? {
//!     println!("{} {}", torrent.hash, torrent.name);
//! }
//! ```

mod error;
mod impls;
mod settings;
mod traits;

use std::sync::Arc;

use model::PluginSettings;

pub use crate::error::{Result, RpcError};
pub use crate::impls::{Deluge, QBittorrent, Transmission, UTorrent};
pub use crate::settings::{excluded_indices, RpcSettings};
pub use crate::traits::Rpc;

/// Constructor of a client from its persisted settings.
pub type SpawnRpc = fn(&PluginSettings) -> Result<Arc<dyn Rpc>>;

/// Registry entry describing a client implementation.
#[derive(Clone, Copy)]
pub struct RpcClass {
    pub alias: &'static str,
    pub spawn: SpawnRpc,
}

/// Every supported client.
pub fn classes() -> Vec<RpcClass> {
    vec![
        RpcClass {
            alias: Transmission::ALIAS,
            spawn: Transmission::spawn,
        },
        RpcClass {
            alias: QBittorrent::ALIAS,
            spawn: QBittorrent::spawn,
        },
        RpcClass {
            alias: Deluge::ALIAS,
            spawn: Deluge::spawn,
        },
        RpcClass {
            alias: UTorrent::ALIAS,
            spawn: UTorrent::spawn,
        },
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_from_settings() {
        let mut settings = PluginSettings::new();
        settings.insert("host".into(), "nas".into());
        settings.insert("port".into(), toml::Value::Integer(9999));
        settings.insert("enabled".into(), true.into());

        let class = classes().into_iter().find(|c| c.alias == "transmission").unwrap();
        let client = (class.spawn)(&settings).unwrap();

        assert_eq!(client.alias(), "transmission");
        assert!(client.enabled());
        assert_eq!(client.to_settings(), settings);
    }

    #[test]
    fn test_spawn_rejects_bad_settings() {
        let mut settings = PluginSettings::new();
        settings.insert("port".into(), "not a port".into());

        for class in classes() {
            assert!(matches!((class.spawn)(&settings), Err(RpcError::Config(_))));
        }
    }
}
