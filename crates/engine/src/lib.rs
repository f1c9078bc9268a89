//! Plugin registry and reconciliation engine.
//!
//! The engine owns the plugin registries and the state store. `walk` compares
//! every registered torrent with its tracker page and swaps outdated torrents
//! in the torrent clients; the toolbox operations configure plugins and manage
//! the registered set.
//!
//! # Example
//!
//! ```rust,ignore
//! use engine::{Engine, FileStore, WalkOptions};
//!
//! let store = Arc::new(FileStore::open("retorrent.toml").await?);
//! let engine = Engine::open(store, HttpClient::new(HttpConfig::default())?).await?;
//! let report = engine.walk(WalkOptions::default()).await?;
//! ```

mod error;
mod plugins;
mod registry;
mod store;
mod toolbox;
mod walk;

use std::sync::Arc;

use tracker::HttpClient;

pub use crate::error::{EngineError, Result};
pub use crate::plugins::Plugins;
pub use crate::registry::{Plugin, Registry, RegistryError};
pub use crate::store::{ConfigStore, FileStore, MemoryStore, Mutation, Section, State, StoreError};
pub use crate::toolbox::{NotifierStatus, RpcStatus, TrackerStatus};
pub use crate::walk::{Updated, WalkOptions, WalkReport};

pub struct Engine {
    store: Arc<dyn ConfigStore>,
    plugins: Plugins,
}

impl Engine {
    /// Load the state and instantiate every configured plugin.
    pub async fn open(store: Arc<dyn ConfigStore>, http: HttpClient) -> Result<Self> {
        let state = store.load().await?;
        let plugins = Plugins::bootstrap(&state, http);
        Ok(Self { store, plugins })
    }

    pub fn new(store: Arc<dyn ConfigStore>, plugins: Plugins) -> Self {
        Self { store, plugins }
    }

    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use model::{ClientTorrent, PluginSettings, TorrentParams, TorrentRecord};
    use notify::Notifier;
    use parking_lot::Mutex;
    use rpc::{excluded_indices, Rpc, RpcError};
    use tracker::{HttpClient, HttpConfig, Tracker, TrackerError};

    use crate::store::{MemoryStore, State};
    use crate::{Engine, Plugins, Updated};

    /// (new hash, download_to, excluded file indices)
    pub type Added = (String, Option<String>, Vec<usize>);

    #[derive(Clone)]
    pub struct FakeRpc {
        alias: &'static str,
        enabled: Arc<AtomicBool>,
        torrents: Arc<Vec<ClientTorrent>>,
        added: Arc<Mutex<Vec<Added>>>,
        removed: Arc<Mutex<Vec<(String, bool)>>>,
        fail_add: Arc<Mutex<HashSet<String>>>,
        fail_list: Arc<AtomicBool>,
        lists: Arc<AtomicUsize>,
    }

    impl FakeRpc {
        pub fn new(alias: &'static str, torrents: Vec<ClientTorrent>) -> Self {
            Self {
                alias,
                enabled: Arc::new(AtomicBool::new(true)),
                torrents: Arc::new(torrents),
                added: Default::default(),
                removed: Default::default(),
                fail_add: Default::default(),
                fail_list: Default::default(),
                lists: Default::default(),
            }
        }

        pub fn disable(&self) {
            self.enabled.store(false, Ordering::SeqCst);
        }

        pub fn fail_add(&self, hash: &str) {
            self.fail_add.lock().insert(hash.to_string());
        }

        pub fn fail_list(&self) {
            self.fail_list.store(true, Ordering::SeqCst);
        }

        pub fn added(&self) -> Vec<Added> {
            self.added.lock().clone()
        }

        pub fn removed(&self) -> Vec<(String, bool)> {
            self.removed.lock().clone()
        }

        pub fn lists(&self) -> usize {
            self.lists.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Rpc for FakeRpc {
        fn alias(&self) -> &str {
            self.alias
        }

        fn enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }

        async fn list_torrents(&self, hashes: Option<&[String]>) -> rpc::Result<Vec<ClientTorrent>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(RpcError::Protocol("daemon is down".into()));
            }
            Ok(self
                .torrents
                .iter()
                .filter(|t| hashes.map_or(true, |h| h.contains(&t.hash)))
                .cloned()
                .collect())
        }

        async fn add_torrent(
            &self,
            torrent: &TorrentRecord,
            download_to: Option<&str>,
            params: Option<&TorrentParams>,
        ) -> rpc::Result<()> {
            if self.fail_add.lock().contains(&torrent.hash) {
                return Err(RpcError::InvalidTorrent(torrent.hash.clone()));
            }
            let excluded = torrent
                .metainfo
                .as_ref()
                .map(|m| excluded_indices(m, params))
                .unwrap_or_default();
            self.added.lock().push((
                torrent.hash.clone(),
                download_to.map(str::to_string),
                excluded,
            ));
            Ok(())
        }

        async fn remove_torrent(&self, hash: &str, with_data: bool) -> rpc::Result<()> {
            self.removed.lock().push((hash.to_string(), with_data));
            Ok(())
        }

        async fn version(&self) -> rpc::Result<String> {
            Ok("fake".into())
        }

        fn to_settings(&self) -> PluginSettings {
            PluginSettings::new()
        }
    }

    #[derive(Clone)]
    pub struct FakeTracker {
        alias: &'static str,
        mirrors: Vec<String>,
        records: BTreeMap<String, TorrentRecord>,
        fetches: Arc<AtomicUsize>,
        session: Arc<Mutex<Option<PluginSettings>>>,
    }

    impl FakeTracker {
        pub fn new(alias: &'static str) -> Self {
            Self {
                alias,
                mirrors: Vec::new(),
                records: BTreeMap::new(),
                fetches: Default::default(),
                session: Default::default(),
            }
        }

        /// Report a refreshed login session on the next `take_settings_update`.
        pub fn refreshing(self, settings: PluginSettings) -> Self {
            *self.session.lock() = Some(settings);
            self
        }

        pub fn serving(mut self, url: &str, record: TorrentRecord) -> Self {
            self.records.insert(url.to_string(), record);
            self
        }

        pub fn record(&self, url: &str) -> TorrentRecord {
            self.records[url].clone()
        }

        pub fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tracker for FakeTracker {
        fn alias(&self) -> &str {
            self.alias
        }

        fn mirrors(&self) -> &[String] {
            &self.mirrors
        }

        fn login_required(&self) -> bool {
            false
        }

        async fn fetch_torrent(&self, url: &str) -> tracker::Result<TorrentRecord> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.records
                .get(url)
                .cloned()
                .ok_or_else(|| TrackerError::LinkNotFound(url.to_string()))
        }

        async fn test_configuration(&self) -> tracker::Result<bool> {
            Ok(true)
        }

        fn to_settings(&self) -> PluginSettings {
            PluginSettings::new()
        }

        fn take_settings_update(&self) -> Option<PluginSettings> {
            self.session.lock().take()
        }
    }

    pub struct FakeNotifier {
        alias: &'static str,
        sent: Mutex<Vec<Updated>>,
    }

    impl FakeNotifier {
        pub fn new(alias: &'static str) -> Arc<Self> {
            Arc::new(Self {
                alias,
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn sent(&self) -> Vec<Updated> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn alias(&self) -> &str {
            self.alias
        }

        async fn send_message(&self, _text: &str) -> notify::Result<()> {
            Ok(())
        }

        async fn send(&self, updated: &Updated) -> notify::Result<()> {
            self.sent.lock().push(updated.clone());
            Ok(())
        }

        fn to_settings(&self) -> PluginSettings {
            PluginSettings::new()
        }
    }

    pub fn http() -> HttpClient {
        HttpClient::new(HttpConfig::default()).unwrap()
    }

    /// Engine over an in-memory store with the given fakes registered.
    pub fn engine(state: State, rpc: &FakeRpc, tracker: &FakeTracker) -> (Engine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(state));
        let engine = Engine::new(store.clone(), Plugins::new(http()));
        engine.plugins().set_rpc(Arc::new(rpc.clone()));
        engine.plugins().set_tracker(Arc::new(tracker.clone()));
        (engine, store)
    }
}
