use std::sync::Arc;

use async_trait::async_trait;
use bot::{Bot, BotCommands, BotError};
use model::{find_url, PluginSettings, TorrentRecord};
use notify::Notifier;
use rpc::Rpc;
use tracker::Tracker;

use crate::error::{EngineError, Result};
use crate::store::Section;
use crate::walk::WalkOptions;
use crate::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub alias: String,
    pub configured: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStatus {
    pub alias: String,
    pub login_required: bool,
    /// A live tracker object exists (public, or private with credentials).
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierStatus {
    pub alias: String,
    pub configured: bool,
}

impl Engine {
    /// Configure a torrent client: spawn it from `settings`, check the
    /// connection and persist the settings. A new client is enabled unless
    /// the settings say otherwise.
    pub async fn configure_rpc(&self, alias: &str, mut settings: PluginSettings) -> Result<()> {
        let class = self
            .plugins
            .rpc_class(alias)
            .ok_or_else(|| EngineError::unknown("RPC", alias))?;
        if !settings.contains_key("enabled") {
            settings.insert("enabled".into(), toml::Value::Boolean(true));
        }

        let rpc = (class.spawn)(&settings)?;
        self.ensure(alias, rpc.test_configuration().await?)?;
        self.store
            .update_section(Section::Rpc, alias, rpc.to_settings())
            .await?;
        self.plugins.set_rpc(rpc);
        tracing::info!("RPC {} is configured", alias);
        Ok(())
    }

    /// Configure a tracker, typically credentials of a private one. The test
    /// login's session is saved with the settings.
    pub async fn configure_tracker(&self, alias: &str, settings: PluginSettings) -> Result<()> {
        let class = self
            .plugins
            .tracker_class(alias)
            .ok_or_else(|| EngineError::unknown("tracker", alias))?;

        let tracker = (class.spawn)(&settings, self.plugins.http().clone())?;
        self.ensure(alias, tracker.test_configuration().await?)?;
        tracker.take_settings_update();
        self.store
            .update_section(Section::Trackers, alias, tracker.to_settings())
            .await?;
        self.plugins.set_tracker(tracker);
        tracing::info!("Tracker {} is configured", alias);
        Ok(())
    }

    pub async fn configure_notifier(&self, alias: &str, settings: PluginSettings) -> Result<()> {
        let class = self
            .plugins
            .notifier_class(alias)
            .ok_or_else(|| EngineError::unknown("notifier", alias))?;

        let notifier = (class.spawn)(&settings)?;
        self.ensure(alias, notifier.test_configuration().await?)?;
        self.store
            .update_section(Section::Notifiers, alias, notifier.to_settings())
            .await?;
        self.plugins.set_notifier(notifier);
        tracing::info!("Notifier {} is configured", alias);
        Ok(())
    }

    pub async fn configure_bot(&self, alias: &str, settings: PluginSettings) -> Result<()> {
        let class = self
            .plugins
            .bot_class(alias)
            .ok_or_else(|| EngineError::unknown("bot", alias))?;

        let bot = (class.spawn)(&settings)?;
        self.ensure(alias, bot.test_configuration().await?)?;
        self.store
            .update_section(Section::Bots, alias, bot.to_settings())
            .await?;
        self.plugins.set_bot(bot);
        tracing::info!("Bot {} is configured", alias);
        Ok(())
    }

    pub async fn remove_notifier(&self, alias: &str) -> Result<()> {
        self.plugins
            .remove_notifier(alias)
            .ok_or_else(|| EngineError::unknown("notifier", alias))?;
        self.store.drop_section(Section::Notifiers, alias).await?;
        Ok(())
    }

    pub async fn remove_bot(&self, alias: &str) -> Result<()> {
        self.plugins
            .remove_bot(alias)
            .ok_or_else(|| EngineError::unknown("bot", alias))?;
        self.store.drop_section(Section::Bots, alias).await?;
        Ok(())
    }

    /// Enable or disable a configured client without touching its other settings.
    pub async fn toggle_rpc(&self, alias: &str, enabled: bool) -> Result<()> {
        let class = self
            .plugins
            .rpc_class(alias)
            .ok_or_else(|| EngineError::unknown("RPC", alias))?;
        let mut settings = self
            .store
            .load()
            .await?
            .rpc
            .remove(alias)
            .ok_or_else(|| EngineError::unknown("configured RPC", alias))?;
        settings.insert("enabled".into(), toml::Value::Boolean(enabled));

        let rpc = (class.spawn)(&settings)?;
        self.store
            .update_section(Section::Rpc, alias, rpc.to_settings())
            .await?;
        self.plugins.set_rpc(rpc);
        tracing::info!("RPC {} is {}", alias, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn set_walk_interval(&self, hours: u64) -> Result<()> {
        self.store
            .transact(Box::new(move |state| state.walk_interval_hours = hours))
            .await?;
        Ok(())
    }

    /// Register a torrent that is already in a client. Its page URL comes from
    /// `url` or from the client's comment; the name from the client.
    pub async fn register_torrent(&self, hash: &str, url: Option<&str>) -> Result<TorrentRecord> {
        let mut record = TorrentRecord::new(hash);
        if let Some(url) = url {
            record.url = url.to_string();
        }

        let hashes = [record.hash.clone()];
        for rpc in self.plugins.enabled_rpcs() {
            match rpc.list_torrents(Some(hashes.as_slice())).await {
                Ok(torrents) => {
                    if let Some(live) = torrents.into_iter().find(|t| t.hash == record.hash) {
                        record.name = live.name;
                        if record.url.is_empty() {
                            record.url = find_url(&live.comment).unwrap_or_default().to_string();
                        }
                        break;
                    }
                }
                Err(e) => tracing::warn!("Cannot look up {} in {}: {}", record.hash, rpc.alias(), e),
            }
        }
        if record.url.is_empty() {
            tracing::warn!("Torrent {} has no tracker page URL; it is kept but never updated", record.hash);
        }

        let stored = record.clone();
        self.store
            .transact(Box::new(move |state| {
                state.torrents.insert(stored.hash.clone(), stored);
            }))
            .await?;
        tracing::info!("Torrent {} is registered", record.hash);
        Ok(record)
    }

    /// Returns whether the torrent was registered.
    pub async fn unregister_torrent(&self, hash: &str) -> Result<bool> {
        let hash = hash.to_lowercase();
        if !self.store.load().await?.torrents.contains_key(&hash) {
            return Ok(false);
        }
        let key = hash.clone();
        self.store
            .transact(Box::new(move |state| {
                state.torrents.remove(&key);
            }))
            .await?;
        tracing::info!("Torrent {} is unregistered", hash);
        Ok(true)
    }

    pub async fn registered_torrents(&self) -> Result<Vec<TorrentRecord>> {
        Ok(self.store.load().await?.torrents.into_values().collect())
    }

    /// Fetch the torrent published at `url`, add it to every enabled client and
    /// register it.
    pub async fn add_torrent_from_url(&self, url: &str, download_to: Option<&str>) -> Result<TorrentRecord> {
        let tracker = self
            .plugins
            .tracker_for(url)
            .ok_or_else(|| EngineError::NoTracker(url.to_string()))?;
        let rpcs = self.plugins.enabled_rpcs();
        if rpcs.is_empty() {
            return Err(EngineError::NoRpc);
        }

        let fetched = tracker.fetch_torrent(url).await;
        self.persist_tracker_updates().await?;
        let record = fetched?;

        for rpc in &rpcs {
            rpc.add_torrent(&record, download_to, None).await?;
            tracing::info!("Torrent {} is added to {}", record.display_name(), rpc.alias());
        }

        let stored = record.stored();
        self.store
            .transact(Box::new(move |state| {
                state.torrents.insert(stored.hash.clone(), stored);
            }))
            .await?;
        Ok(record)
    }

    /// Remove a torrent from every enabled client and unregister it.
    pub async fn remove_torrent(&self, hash: &str, with_data: bool) -> Result<()> {
        let rpcs = self.plugins.enabled_rpcs();
        if rpcs.is_empty() {
            return Err(EngineError::NoRpc);
        }
        let hash = hash.to_lowercase();
        for rpc in &rpcs {
            rpc.remove_torrent(&hash, with_data).await?;
        }
        self.unregister_torrent(&hash).await?;
        Ok(())
    }

    pub fn rpc_statuses(&self) -> Vec<RpcStatus> {
        self.plugins
            .rpc_classes()
            .iter()
            .map(|class| {
                let rpc = self.plugins.rpc(class.alias);
                RpcStatus {
                    alias: class.alias.to_string(),
                    configured: rpc.is_some(),
                    enabled: rpc.is_some_and(|rpc| rpc.enabled()),
                }
            })
            .collect()
    }

    pub fn notifier_statuses(&self) -> Vec<NotifierStatus> {
        self.plugins
            .notifier_classes()
            .iter()
            .map(|class| NotifierStatus {
                alias: class.alias.to_string(),
                configured: self.plugins.notifier(class.alias).is_some(),
            })
            .collect()
    }

    pub fn tracker_statuses(&self) -> Vec<TrackerStatus> {
        self.plugins
            .tracker_classes()
            .iter()
            .map(|class| TrackerStatus {
                alias: class.alias.to_string(),
                login_required: class.login_required,
                active: self.plugins.tracker(class.alias).is_some(),
            })
            .collect()
    }

    pub fn tracker_aliases(&self) -> Vec<String> {
        self.plugins
            .tracker_classes()
            .iter()
            .map(|class| class.alias.to_string())
            .collect()
    }

    /// Run the given bots (all configured ones when `aliases` is empty) until
    /// every one of them stops.
    pub async fn run_bots(self: &Arc<Self>, aliases: &[String]) -> Result<()> {
        let bots: Vec<Arc<dyn Bot>> = if aliases.is_empty() {
            self.plugins.bots()
        } else {
            aliases
                .iter()
                .map(|alias| {
                    self.plugins
                        .bot(alias)
                        .ok_or_else(|| EngineError::unknown("bot", alias.as_str()))
                })
                .collect::<Result<_>>()?
        };
        if bots.is_empty() {
            tracing::warn!("No bots are configured");
            return Ok(());
        }

        let commands: Arc<dyn BotCommands> = self.clone();
        let runs = bots.iter().map(|bot| {
            let commands = commands.clone();
            async move {
                tracing::info!("Starting bot {}", bot.alias());
                bot.run(commands).await
            }
        });
        for result in futures::future::join_all(runs).await {
            result?;
        }
        Ok(())
    }

    fn ensure(&self, alias: &str, passed: bool) -> Result<()> {
        if passed {
            Ok(())
        } else {
            Err(EngineError::TestFailed(alias.to_string()))
        }
    }
}

fn command_error(e: EngineError) -> BotError {
    BotError::Command(e.to_string())
}

#[async_trait]
impl BotCommands for Engine {
    async fn registered_torrents(&self) -> bot::Result<Vec<TorrentRecord>> {
        Engine::registered_torrents(self).await.map_err(command_error)
    }

    async fn add_torrent(&self, url: &str) -> bot::Result<TorrentRecord> {
        self.add_torrent_from_url(url, None).await.map_err(command_error)
    }

    async fn remove_torrent(&self, hash: &str) -> bot::Result<()> {
        Engine::remove_torrent(self, hash, false)
            .await
            .map_err(command_error)
    }

    async fn walk(&self) -> bot::Result<Vec<TorrentRecord>> {
        let options = WalkOptions {
            forced: true,
            ..Default::default()
        };
        let report = Engine::walk(self, options).await.map_err(command_error)?;
        Ok(report.updated.into_values().collect())
    }
}
