use std::sync::Arc;

use async_trait::async_trait;
use model::{from_settings, to_settings, PluginSettings, TorrentRecord};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthSession, AuthSettings};
use crate::base::{RequestAuth, TrackerCore};
use crate::error::{Result, TrackerError};
use crate::http::{HttpClient, HttpRequest};
use crate::site::{LinkLookup, Site};

/// A torrent tracker site able to produce the current `.torrent` for a page.
#[async_trait]
pub trait Tracker: Send + Sync {
    fn alias(&self) -> &str;

    fn mirrors(&self) -> &[String];

    fn login_required(&self) -> bool;

    /// Whether `s` (usually a page URL) belongs to this tracker.
    fn can_handle(&self, s: &str) -> bool {
        s.contains(self.alias()) || self.mirrors().iter().any(|m| s.contains(m.as_str()))
    }

    /// Fetch the torrent currently published at `url`.
    ///
    /// Private trackers log in at most once per call when the page shows the
    /// anonymous view.
    async fn fetch_torrent(&self, url: &str) -> Result<TorrentRecord>;

    /// Check the configuration, e.g. with a test login.
    async fn test_configuration(&self) -> Result<bool>;

    fn to_settings(&self) -> PluginSettings;

    /// Settings to persist after a login refreshed the session, once.
    fn take_settings_update(&self) -> Option<PluginSettings>;
}

#[derive(Serialize, Deserialize, Default)]
struct Settings<S> {
    #[serde(flatten)]
    auth: AuthSettings,
    #[serde(flatten)]
    site: S,
}

/// A tracker assembled from the shared core, an optional login session and a
/// site implementation.
pub struct SiteTracker<S: Site> {
    core: TrackerCore,
    auth: Option<AuthSession>,
    site: S,
}

impl<S: Site> SiteTracker<S> {
    pub fn new(site: S, auth: AuthSettings, http: HttpClient) -> Self {
        let core = TrackerCore::new(S::ALIAS, site.mirrors(), http).with_encoding(S::ENCODING);
        let auth = S::login_spec().map(|spec| AuthSession::new(spec, auth));
        Self { core, auth, site }
    }

    pub fn from_settings(settings: &PluginSettings, http: HttpClient) -> Result<Self> {
        let Settings::<S> { auth, site } = from_settings(S::ALIAS, settings)
            .map_err(|e| TrackerError::Configuration(e.to_string()))?;
        Ok(Self::new(site, auth, http))
    }

    /// Factory used by the tracker class table.
    pub fn spawn(settings: &PluginSettings, http: HttpClient) -> Result<Arc<dyn Tracker>> {
        Ok(Arc::new(Self::from_settings(settings, http)?))
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.auth.as_ref()
    }

    fn request_auth(&self) -> RequestAuth {
        self.auth
            .as_ref()
            .map(AuthSession::request_auth)
            .unwrap_or_default()
    }

    async fn lookup(&self, url: &str, drop_cache: bool) -> Result<(crate::Page, LinkLookup)> {
        let page = self.core.fetch_page(url, &self.request_auth(), drop_cache).await?;
        let lookup = self.site.download_link(&self.core, &page).await?;
        Ok((page, lookup))
    }

    fn settings(&self) -> Settings<&S> {
        Settings {
            auth: self.auth.as_ref().map(AuthSession::settings).unwrap_or_default(),
            site: &self.site,
        }
    }
}

#[async_trait]
impl<S: Site> Tracker for SiteTracker<S> {
    fn alias(&self) -> &str {
        S::ALIAS
    }

    fn mirrors(&self) -> &[String] {
        self.core.mirrors()
    }

    fn login_required(&self) -> bool {
        self.auth.is_some()
    }

    async fn fetch_torrent(&self, url: &str) -> Result<TorrentRecord> {
        tracing::debug!("Getting torrent from {} ...", url);
        self.core.clear_pages();

        let (mut page, mut lookup) = self.lookup(url, false).await?;

        if lookup == LinkLookup::LoginRequired {
            let Some(session) = &self.auth else {
                return Err(TrackerError::LinkNotFound(url.to_string()));
            };
            tracing::debug!("Login is required to download torrent from {}", url);
            session.mark_anonymous();
            session.login(&self.core, url).await?;
            (page, lookup) = self.lookup(url, true).await?;
        }

        let LinkLookup::Found(link) = lookup else {
            tracing::error!("Cannot find torrent file download link at {}", url);
            return Err(TrackerError::LinkNotFound(url.to_string()));
        };
        tracing::debug!("Torrent download link found: {}", link);

        let download = self.site.download_request(&page, link);
        let auth = self.request_auth();
        let mut cookies = auth.cookies;
        cookies.extend(download.cookies);

        let mut request = HttpRequest::get(&download.url)
            .cookies(cookies)
            .referer(url);
        request.form = download.form;

        let response = self.core.request(request, auth.query.as_deref()).await?;

        let record = TorrentRecord::default()
            .with_raw(response.body)
            .map_err(|source| TrackerError::InvalidPayload {
                url: download.url.clone(),
                source,
            })?;

        Ok(TorrentRecord {
            url: url.to_string(),
            url_file: download.url,
            page: Some(self.site.page_data(&page)).filter(|p| !p.is_empty()),
            ..record
        })
    }

    async fn test_configuration(&self) -> Result<bool> {
        let Some(session) = &self.auth else {
            return Ok(true);
        };
        session
            .login(&self.core, &format!("https://{}/", S::ALIAS))
            .await?;
        Ok(true)
    }

    fn to_settings(&self) -> PluginSettings {
        to_settings(&self.settings())
    }

    fn take_settings_update(&self) -> Option<PluginSettings> {
        self.auth.as_ref()?.take_update()?;
        Some(self.to_settings())
    }
}
