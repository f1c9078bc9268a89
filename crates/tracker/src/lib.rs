//! Tracker sites: page retrieval with mirrors, sessions and caching, plus the
//! per-site link extraction.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracker::{HttpClient, HttpConfig};
//!
//! let http = HttpClient::new(HttpConfig::default())?;
//! let class = tracker::classes().into_iter().find(|c| c.alias == "rutor.org").unwrap();
//! let rutor = (class.spawn)(&Default::default(), http)?;
//! let record = rutor.fetch_torrent("http://rutor.info/torrent/442959").await?;
//! ```

mod auth;
mod base;
mod error;
mod http;
mod page;
mod site;
pub mod sites;
mod tracker;

use std::sync::Arc;

use model::PluginSettings;

pub use crate::auth::{AuthSession, AuthSettings, AuthState, LoginSpec};
pub use crate::base::{RequestAuth, TrackerCore};
pub use crate::error::{Result, TrackerError};
pub use crate::http::{HttpClient, HttpConfig, HttpRequest, HttpResponse};
pub use crate::page::{expand_link, Page};
pub use crate::site::{preferred, DownloadRequest, LinkLookup, Site};
pub use crate::tracker::{SiteTracker, Tracker};

/// Constructor of a tracker from its persisted settings.
pub type SpawnTracker = fn(&PluginSettings, HttpClient) -> Result<Arc<dyn Tracker>>;

/// Registry entry describing a tracker implementation.
#[derive(Clone, Copy)]
pub struct TrackerClass {
    pub alias: &'static str,
    /// Private trackers are only instantiated when credentials are configured.
    pub login_required: bool,
    pub spawn: SpawnTracker,
}

impl TrackerClass {
    pub fn of<S: Site>() -> Self {
        Self {
            alias: S::ALIAS,
            login_required: S::login_spec().is_some(),
            spawn: SiteTracker::<S>::spawn,
        }
    }
}

/// Every known tracker. Order is lookup precedence.
pub fn classes() -> Vec<TrackerClass> {
    use crate::sites::*;

    vec![
        TrackerClass::of::<Rutracker>(),
        TrackerClass::of::<NnmClub>(),
        TrackerClass::of::<Kinozal>(),
        TrackerClass::of::<AniDub>(),
        TrackerClass::of::<EniaHd>(),
        TrackerClass::of::<CasStudio>(),
        TrackerClass::of::<Rutor>(),
        TrackerClass::of::<Anilibria>(),
        TrackerClass::of::<Ytsmx>(),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        let classes = classes();
        let aliases: Vec<_> = classes.iter().map(|c| c.alias).collect();
        assert!(aliases.contains(&"rutracker.org"));
        assert!(aliases.contains(&"yts.mx"));

        let rutor = classes.iter().find(|c| c.alias == "rutor.org").unwrap();
        assert!(!rutor.login_required);
        let nnm = classes.iter().find(|c| c.alias == "nnm-club.me").unwrap();
        assert!(nnm.login_required);
        let cas = classes.iter().find(|c| c.alias == "casstudio.tv").unwrap();
        assert!(cas.login_required);
    }

    #[test]
    fn test_spawn_with_settings() {
        let http = HttpClient::new(HttpConfig::default()).unwrap();
        let class = TrackerClass::of::<sites::Anilibria>();
        let mut settings = PluginSettings::new();
        settings.insert(
            "quality_prefs".into(),
            toml::Value::Array(vec!["WEBRip 720p".into()]),
        );

        let tracker = (class.spawn)(&settings, http).unwrap();
        assert_eq!(tracker.alias(), "anilibria.tv");
        assert!(!tracker.login_required());
        assert_eq!(
            tracker.to_settings().get("quality_prefs"),
            settings.get("quality_prefs")
        );
    }
}
