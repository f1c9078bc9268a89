use std::sync::Arc;

use bot::{Bot, BotClass};
use notify::{Notifier, NotifierClass};
use rpc::{Rpc, RpcClass};
use thiserror::Error;
use tracker::{Tracker, TrackerClass};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Plugin alias must not be empty")]
    EmptyAlias,
}

/// Something registered under a unique alias.
pub trait Plugin {
    fn alias(&self) -> &str;

    /// Content predicate; `None` falls back to an alias substring match.
    fn can_handle(&self, _s: &str) -> Option<bool> {
        None
    }
}

/// Alias-keyed registry that keeps insertion order.
///
/// Insertion order is also lookup precedence for [`Registry::find_for`].
pub struct Registry<T: ?Sized> {
    entries: Vec<Arc<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized + Plugin> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. An existing entry with the same alias is replaced in place.
    pub fn register(&mut self, plugin: Arc<T>) -> Result<(), RegistryError> {
        if plugin.alias().is_empty() {
            return Err(RegistryError::EmptyAlias);
        }
        match self.position(plugin.alias()) {
            Some(index) => self.entries[index] = plugin,
            None => self.entries.push(plugin),
        }
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<Arc<T>> {
        self.position(alias).map(|i| self.entries[i].clone())
    }

    pub fn remove(&mut self, alias: &str) -> Option<Arc<T>> {
        self.position(alias).map(|i| self.entries.remove(i))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.position(alias).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.entries.iter().map(|p| p.alias().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First plugin, in insertion order, that handles `s`.
    pub fn find_for(&self, s: &str) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|p| p.can_handle(s).unwrap_or_else(|| s.contains(p.alias())))
            .cloned()
    }

    fn position(&self, alias: &str) -> Option<usize> {
        self.entries.iter().position(|p| p.alias() == alias)
    }
}

impl Plugin for dyn Tracker {
    fn alias(&self) -> &str {
        Tracker::alias(self)
    }

    fn can_handle(&self, s: &str) -> Option<bool> {
        Some(Tracker::can_handle(self, s))
    }
}

impl Plugin for dyn Rpc {
    fn alias(&self) -> &str {
        Rpc::alias(self)
    }
}

impl Plugin for dyn Notifier {
    fn alias(&self) -> &str {
        Notifier::alias(self)
    }
}

impl Plugin for dyn Bot {
    fn alias(&self) -> &str {
        Bot::alias(self)
    }
}

macro_rules! class_plugin {
    ($($class:ty),*) => {
        $(
            impl Plugin for $class {
                fn alias(&self) -> &str {
                    self.alias
                }
            }
        )*
    };
}

class_plugin!(TrackerClass, RpcClass, NotifierClass, BotClass);

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        alias: &'static str,
        tag: u8,
        domains: Option<Vec<&'static str>>,
    }

    impl Plugin for Named {
        fn alias(&self) -> &str {
            self.alias
        }

        fn can_handle(&self, s: &str) -> Option<bool> {
            self.domains
                .as_ref()
                .map(|domains| domains.iter().any(|d| s.contains(d)))
        }
    }

    fn named(alias: &'static str, tag: u8) -> Arc<Named> {
        Arc::new(Named {
            alias,
            tag,
            domains: None,
        })
    }

    #[test]
    fn test_register_get_and_overwrite() {
        let mut registry = Registry::new();
        registry.register(named("rutor.org", 1)).unwrap();
        registry.register(named("kinozal.tv", 2)).unwrap();
        assert_eq!(registry.get("rutor.org").map(|p| p.tag), Some(1));

        registry.register(named("rutor.org", 3)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("rutor.org").map(|p| p.tag), Some(3));
        // Overwrite keeps the original position.
        assert_eq!(registry.aliases(), vec!["rutor.org", "kinozal.tv"]);

        assert!(registry.remove("rutor.org").is_some());
        assert!(registry.get("rutor.org").is_none());
        assert!(registry.remove("rutor.org").is_none());
    }

    #[test]
    fn test_empty_alias_is_rejected() {
        let mut registry = Registry::new();
        assert_eq!(registry.register(named("", 1)), Err(RegistryError::EmptyAlias));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_for_first_match_wins() {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(Named {
                alias: "mirror-aware",
                tag: 1,
                domains: Some(vec!["rutor.info", "rutor.is"]),
            }))
            .unwrap();
        registry.register(named("rutor.is", 2)).unwrap();
        registry.register(named("tv", 3)).unwrap();
        registry.register(named("kinozal.tv", 4)).unwrap();

        // The predicate wins over the later alias match.
        assert_eq!(registry.find_for("http://rutor.is/torrent/1").map(|p| p.tag), Some(1));
        // Without a predicate the alias substring decides; the earlier entry wins.
        assert_eq!(registry.find_for("https://kinozal.tv/details.php?id=1").map(|p| p.tag), Some(3));
        assert!(registry.find_for("https://example.org/").is_none());
    }
}
