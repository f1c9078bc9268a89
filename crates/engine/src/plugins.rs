use std::sync::Arc;

use bot::{Bot, BotClass};
use model::PluginSettings;
use notify::{Notifier, NotifierClass};
use parking_lot::RwLock;
use rpc::{Rpc, RpcClass};
use tracker::{HttpClient, Tracker, TrackerClass};

use crate::registry::Registry;
use crate::store::State;

/// Class and object registries for every plugin family.
///
/// Class registries are filled from the static tables of the family crates and
/// never change afterwards. Object registries hold the live, configured
/// instances.
pub struct Plugins {
    http: HttpClient,
    tracker_classes: Registry<TrackerClass>,
    rpc_classes: Registry<RpcClass>,
    notifier_classes: Registry<NotifierClass>,
    bot_classes: Registry<BotClass>,
    trackers: RwLock<Registry<dyn Tracker>>,
    rpcs: RwLock<Registry<dyn Rpc>>,
    notifiers: RwLock<Registry<dyn Notifier>>,
    bots: RwLock<Registry<dyn Bot>>,
}

fn class_registry<T>(classes: Vec<T>) -> Registry<T>
where
    T: crate::registry::Plugin,
{
    let mut registry = Registry::new();
    for class in classes {
        if let Err(e) = registry.register(Arc::new(class)) {
            tracing::error!("Skipping plugin class: {}", e);
        }
    }
    registry
}

impl Plugins {
    /// Registries with every known class and no live objects.
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            tracker_classes: class_registry(tracker::classes()),
            rpc_classes: class_registry(rpc::classes()),
            notifier_classes: class_registry(notify::classes()),
            bot_classes: class_registry(bot::classes()),
            trackers: RwLock::default(),
            rpcs: RwLock::default(),
            notifiers: RwLock::default(),
            bots: RwLock::default(),
        }
    }

    /// Instantiate one object per alias present in `state`.
    ///
    /// Public trackers are instantiated with defaults when they have no saved
    /// settings; private ones are skipped until configured. Unknown aliases and
    /// settings that fail to load are logged and skipped.
    pub fn bootstrap(state: &State, http: HttpClient) -> Self {
        let plugins = Self::new(http);
        let empty = PluginSettings::new();

        for class in plugins.tracker_classes.iter() {
            let settings = match state.trackers.get(class.alias) {
                Some(settings) => settings,
                None if class.login_required => continue,
                None => &empty,
            };
            match (class.spawn)(settings, plugins.http.clone()) {
                Ok(tracker) => plugins.set_tracker(tracker),
                Err(e) => tracing::warn!("Tracker {} is not loaded: {}", class.alias, e),
            }
        }
        warn_unknown("tracker", state.trackers.keys(), &plugins.tracker_classes);

        for (alias, settings) in &state.rpc {
            match plugins.rpc_classes.get(alias) {
                Some(class) => match (class.spawn)(settings) {
                    Ok(rpc) => plugins.set_rpc(rpc),
                    Err(e) => tracing::warn!("RPC {} is not loaded: {}", alias, e),
                },
                None => tracing::warn!("Unknown RPC `{}` in settings", alias),
            }
        }

        for (alias, settings) in &state.notifiers {
            match plugins.notifier_classes.get(alias) {
                Some(class) => match (class.spawn)(settings) {
                    Ok(notifier) => plugins.set_notifier(notifier),
                    Err(e) => tracing::warn!("Notifier {} is not loaded: {}", alias, e),
                },
                None => tracing::warn!("Unknown notifier `{}` in settings", alias),
            }
        }

        for (alias, settings) in &state.bots {
            match plugins.bot_classes.get(alias) {
                Some(class) => match (class.spawn)(settings) {
                    Ok(bot) => plugins.set_bot(bot),
                    Err(e) => tracing::warn!("Bot {} is not loaded: {}", alias, e),
                },
                None => tracing::warn!("Unknown bot `{}` in settings", alias),
            }
        }

        plugins
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn tracker_class(&self, alias: &str) -> Option<Arc<TrackerClass>> {
        self.tracker_classes.get(alias)
    }

    pub fn tracker_classes(&self) -> Vec<Arc<TrackerClass>> {
        self.tracker_classes.iter().cloned().collect()
    }

    pub fn rpc_class(&self, alias: &str) -> Option<Arc<RpcClass>> {
        self.rpc_classes.get(alias)
    }

    pub fn rpc_classes(&self) -> Vec<Arc<RpcClass>> {
        self.rpc_classes.iter().cloned().collect()
    }

    pub fn notifier_class(&self, alias: &str) -> Option<Arc<NotifierClass>> {
        self.notifier_classes.get(alias)
    }

    pub fn notifier_classes(&self) -> Vec<Arc<NotifierClass>> {
        self.notifier_classes.iter().cloned().collect()
    }

    pub fn bot_class(&self, alias: &str) -> Option<Arc<BotClass>> {
        self.bot_classes.get(alias)
    }

    pub fn tracker(&self, alias: &str) -> Option<Arc<dyn Tracker>> {
        self.trackers.read().get(alias)
    }

    /// Tracker responsible for a page URL; first registered match wins.
    pub fn tracker_for(&self, url: &str) -> Option<Arc<dyn Tracker>> {
        self.trackers.read().find_for(url)
    }

    pub fn trackers(&self) -> Vec<Arc<dyn Tracker>> {
        self.trackers.read().iter().cloned().collect()
    }

    pub fn set_tracker(&self, tracker: Arc<dyn Tracker>) {
        register(&self.trackers, tracker);
    }

    pub fn rpc(&self, alias: &str) -> Option<Arc<dyn Rpc>> {
        self.rpcs.read().get(alias)
    }

    pub fn rpcs(&self) -> Vec<Arc<dyn Rpc>> {
        self.rpcs.read().iter().cloned().collect()
    }

    pub fn enabled_rpcs(&self) -> Vec<Arc<dyn Rpc>> {
        self.rpcs().into_iter().filter(|rpc| rpc.enabled()).collect()
    }

    pub fn set_rpc(&self, rpc: Arc<dyn Rpc>) {
        register(&self.rpcs, rpc);
    }

    pub fn notifier(&self, alias: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.read().get(alias)
    }

    pub fn notifiers(&self) -> Vec<Arc<dyn Notifier>> {
        self.notifiers.read().iter().cloned().collect()
    }

    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        register(&self.notifiers, notifier);
    }

    pub fn remove_notifier(&self, alias: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.write().remove(alias)
    }

    pub fn bot(&self, alias: &str) -> Option<Arc<dyn Bot>> {
        self.bots.read().get(alias)
    }

    pub fn bots(&self) -> Vec<Arc<dyn Bot>> {
        self.bots.read().iter().cloned().collect()
    }

    pub fn set_bot(&self, bot: Arc<dyn Bot>) {
        register(&self.bots, bot);
    }

    pub fn remove_bot(&self, alias: &str) -> Option<Arc<dyn Bot>> {
        self.bots.write().remove(alias)
    }
}

fn register<T>(registry: &RwLock<Registry<T>>, plugin: Arc<T>)
where
    T: ?Sized + crate::registry::Plugin,
{
    if let Err(e) = registry.write().register(plugin) {
        tracing::error!("Plugin is not registered: {}", e);
    }
}

fn warn_unknown<'a, T>(family: &str, aliases: impl Iterator<Item = &'a String>, classes: &Registry<T>)
where
    T: crate::registry::Plugin,
{
    for alias in aliases {
        if !classes.contains(alias) {
            tracing::warn!("Unknown {} `{}` in settings", family, alias);
        }
    }
}
