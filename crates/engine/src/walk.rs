use std::collections::{BTreeMap, HashMap};

use chrono::{TimeZone, Utc};
use model::{find_url, ClientTorrent, TorrentRecord};
use rpc::Rpc;

use crate::error::Result;
use crate::store::Section;
use crate::Engine;

/// Replaced torrents keyed by their old info-hash.
pub type Updated = BTreeMap<String, TorrentRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Ignore the walk interval.
    pub forced: bool,
    /// Log errors instead of returning them.
    pub silent: bool,
    /// Remove the outdated torrent from the client after adding its replacement.
    pub remove_outdated: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            forced: false,
            silent: false,
            remove_outdated: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct WalkReport {
    /// The interval had not elapsed; nothing was checked.
    pub postponed: bool,
    pub updated: Updated,
}

/// Fetch results of one run by page URL. Failures are cached as `None`.
type FetchCache = HashMap<String, Option<TorrentRecord>>;

impl Engine {
    /// Check every registered torrent against its tracker page and replace the
    /// ones the tracker has updated.
    pub async fn walk(&self, options: WalkOptions) -> Result<WalkReport> {
        let state = self.store.load().await?;
        let now = Utc::now().timestamp();

        if !options.forced {
            let interval = (state.walk_interval_hours as i64).saturating_mul(3600);
            let next = state.time_last_check.saturating_add(interval);
            if now < next {
                let till = Utc
                    .timestamp_opt(next, 0)
                    .single()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| next.to_string());
                tracing::info!("Torrent walk is postponed till {}", till);
                return Ok(WalkReport {
                    postponed: true,
                    ..Default::default()
                });
            }
        }

        tracing::info!("Torrent walk started");
        let result = self
            .update_torrents(&state.torrents, options.remove_outdated)
            .await;
        if let Err(e) = self.persist_tracker_updates().await {
            if !options.silent {
                return Err(e);
            }
            tracing::error!("Failed to save tracker sessions: {}", e);
        }

        let updated = match result {
            Ok(updated) => updated,
            Err(e) if options.silent => {
                tracing::error!("Torrent walk failed: {}", e);
                Updated::new()
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self
            .store
            .transact(Box::new(move |state| state.time_last_check = now))
            .await
        {
            if !options.silent {
                return Err(e.into());
            }
            tracing::error!("Failed to save the walk time: {}", e);
        }

        if !updated.is_empty() {
            for notifier in self.plugins.notifiers() {
                if let Err(e) = notifier.send(&updated).await {
                    tracing::error!("Notifier {} failed: {}", notifier.alias(), e);
                }
            }
        }
        tracing::info!("Torrent walk finished, {} torrent(s) updated", updated.len());

        Ok(WalkReport {
            postponed: false,
            updated,
        })
    }

    /// Replace outdated torrents in every enabled client.
    ///
    /// Failures of a single torrent are logged and skipped; failing to list a
    /// client's torrents aborts the run.
    pub async fn update_torrents(
        &self,
        registered: &BTreeMap<String, TorrentRecord>,
        remove_outdated: bool,
    ) -> Result<Updated> {
        let mut updated = Updated::new();
        if registered.is_empty() {
            tracing::info!("No torrents are registered");
            return Ok(updated);
        }
        let hashes: Vec<String> = registered.keys().cloned().collect();
        let mut cache = FetchCache::new();

        for rpc in self.plugins.rpcs() {
            if !rpc.enabled() {
                tracing::debug!("RPC {} is disabled, skipping", rpc.alias());
                continue;
            }
            tracing::info!("Checking torrents in {} ...", rpc.alias());

            let torrents = rpc.list_torrents(Some(hashes.as_slice())).await?;
            for live in torrents {
                let Some(url) = page_url(&live, registered.get(&live.hash)) else {
                    tracing::warn!("Torrent {} has no tracker page URL, skipping", live.hash);
                    continue;
                };
                let Some(new) = self.fetch_cached(&mut cache, &url).await else {
                    continue;
                };

                if new.hash == live.hash {
                    tracing::debug!("Torrent {} is up to date", live.name);
                    continue;
                }
                self.replace(rpc.as_ref(), &live, new, remove_outdated, &mut updated)
                    .await;
            }
        }
        Ok(updated)
    }

    async fn fetch_cached(&self, cache: &mut FetchCache, url: &str) -> Option<TorrentRecord> {
        if let Some(cached) = cache.get(url) {
            return cached.clone();
        }

        let fetched = match self.plugins.tracker_for(url) {
            None => {
                tracing::warn!("No tracker can handle {}, skipping", url);
                None
            }
            Some(tracker) => match tracker.fetch_torrent(url).await {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::error!("Failed to get torrent from {}: {}", url, e);
                    None
                }
            },
        };
        cache.insert(url.to_string(), fetched.clone());
        fetched
    }

    async fn replace(
        &self,
        rpc: &dyn Rpc,
        live: &ClientTorrent,
        new: TorrentRecord,
        remove_outdated: bool,
        updated: &mut Updated,
    ) {
        tracing::info!("Torrent {} is updated, replacing {} with {}", live.name, live.hash, new.hash);

        let params = Some(&live.params).filter(|p| !p.is_empty());
        if let Err(e) = rpc
            .add_torrent(&new, live.download_to.as_deref(), params)
            .await
        {
            tracing::error!("Failed to add torrent {} to {}: {}", new.hash, rpc.alias(), e);
            return;
        }
        updated.insert(live.hash.clone(), new.clone());

        let old = live.hash.clone();
        let stored = new.stored();
        let unregistered = self
            .store
            .transact(Box::new(move |state| {
                state.torrents.remove(&old);
                state.torrents.insert(stored.hash.clone(), stored);
            }))
            .await;
        if let Err(e) = unregistered {
            tracing::error!("Failed to unregister torrent {}: {}", live.hash, e);
        }

        if remove_outdated {
            if let Err(e) = rpc.remove_torrent(&live.hash, false).await {
                tracing::error!("Failed to remove torrent {} from {}: {}", live.hash, rpc.alias(), e);
            }
        }
    }

    /// Save tracker sessions refreshed by logins.
    pub(crate) async fn persist_tracker_updates(&self) -> Result<()> {
        for tracker in self.plugins.trackers() {
            if let Some(settings) = tracker.take_settings_update() {
                tracing::debug!("Saving refreshed session of {}", tracker.alias());
                self.store
                    .update_section(Section::Trackers, tracker.alias(), settings)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Tracker page of a client torrent: first URL in its comment, else the URL it
/// was registered with.
fn page_url(live: &ClientTorrent, registered: Option<&TorrentRecord>) -> Option<String> {
    find_url(&live.comment)
        .map(str::to_string)
        .or_else(|| registered.map(|r| r.url.clone()).filter(|u| !u.is_empty()))
}
