use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use model::{PluginSettings, TorrentRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read or write state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn default_walk_interval() -> u64 {
    1
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    /// Unix timestamp of the last completed walk.
    pub time_last_check: i64,
    #[serde(default = "default_walk_interval")]
    pub walk_interval_hours: u64,
    pub rpc: BTreeMap<String, PluginSettings>,
    pub trackers: BTreeMap<String, PluginSettings>,
    pub notifiers: BTreeMap<String, PluginSettings>,
    pub bots: BTreeMap<String, PluginSettings>,
    /// Registered torrents by info-hash.
    pub torrents: BTreeMap<String, TorrentRecord>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            time_last_check: 0,
            walk_interval_hours: default_walk_interval(),
            rpc: BTreeMap::new(),
            trackers: BTreeMap::new(),
            notifiers: BTreeMap::new(),
            bots: BTreeMap::new(),
            torrents: BTreeMap::new(),
        }
    }
}

/// Plugin settings sections of [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Rpc,
    Trackers,
    Notifiers,
    Bots,
}

impl State {
    pub fn section(&self, section: Section) -> &BTreeMap<String, PluginSettings> {
        match section {
            Section::Rpc => &self.rpc,
            Section::Trackers => &self.trackers,
            Section::Notifiers => &self.notifiers,
            Section::Bots => &self.bots,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, PluginSettings> {
        match section {
            Section::Rpc => &mut self.rpc,
            Section::Trackers => &mut self.trackers,
            Section::Notifiers => &mut self.notifiers,
            Section::Bots => &mut self.bots,
        }
    }
}

pub type Mutation = Box<dyn FnOnce(&mut State) + Send>;

/// Persistent engine state.
///
/// Every write is a whole-document read-modify-write under one writer lock.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<State>;

    /// Apply `mutation` and persist; returns the new state.
    async fn transact(&self, mutation: Mutation) -> Result<State>;

    async fn update_section(&self, section: Section, alias: &str, settings: PluginSettings) -> Result<State> {
        let alias = alias.to_string();
        self.transact(Box::new(move |state| {
            state.section_mut(section).insert(alias, settings);
        }))
        .await
    }

    async fn drop_section(&self, section: Section, alias: &str) -> Result<State> {
        let alias = alias.to_string();
        self.transact(Box::new(move |state| {
            state.section_mut(section).remove(&alias);
        }))
        .await
    }
}

/// TOML file store.
pub struct FileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, creating it with defaults when missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        };
        if !tokio::fs::try_exists(&store.path).await? {
            if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            store.save(&State::default()).await?;
            tracing::info!("Created state file {}", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<State> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(toml::from_str(&content)?)
    }

    /// Save state to the TOML file atomically (temp file, then rename).
    async fn save(&self, state: &State) -> Result<()> {
        let toml_str = toml::to_string_pretty(state)?;

        let tmp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp_path, &toml_str).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Tracker credentials and cookies live here.
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn load(&self) -> Result<State> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn transact(&self, mutation: Mutation) -> Result<State> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        mutation(&mut state);
        self.save(&state).await?;
        Ok(state)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    state: parking_lot::Mutex<State>,
}

impl MemoryStore {
    pub fn new(state: State) -> Self {
        Self {
            state: parking_lot::Mutex::new(state),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<State> {
        Ok(self.state.lock().clone())
    }

    async fn transact(&self, mutation: Mutation) -> Result<State> {
        let mut state = self.state.lock();
        mutation(&mut *state);
        Ok(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");
        let store = FileStore::open(&path).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state, State::default());

        let mut settings = PluginSettings::new();
        settings.insert("host".into(), "nas".into());
        store.update_section(Section::Rpc, "transmission", settings.clone()).await.unwrap();
        store
            .transact(Box::new(|state| {
                state.walk_interval_hours = 6;
                state
                    .torrents
                    .insert("aaaa".into(), TorrentRecord::new("aaaa").with_url("https://rutor.org/torrent/1"));
            }))
            .await
            .unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        let state = reopened.load().await.unwrap();
        assert_eq!(state.walk_interval_hours, 6);
        assert_eq!(state.rpc.get("transmission"), Some(&settings));
        assert_eq!(state.torrents["aaaa"].url, "https://rutor.org/torrent/1");

        reopened.drop_section(Section::Rpc, "transmission").await.unwrap();
        assert!(reopened.load().await.unwrap().rpc.is_empty());
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        FileStore::open(&path).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_keys_get_defaults() {
        let state: State = toml::from_str("time_last_check = 5\n").unwrap();
        assert_eq!(state.time_last_check, 5);
        assert_eq!(state.walk_interval_hours, 1);
        assert!(state.torrents.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_transact() {
        let store = MemoryStore::default();
        let state = store
            .transact(Box::new(|state| state.time_last_check = 42))
            .await
            .unwrap();
        assert_eq!(state.time_last_check, 42);
        assert_eq!(store.load().await.unwrap().time_last_check, 42);
    }
}
