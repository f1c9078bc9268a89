use std::collections::BTreeMap;

use async_trait::async_trait;
use model::PageData;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;

/// Outcome of looking for a download link on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLookup {
    Found(String),
    /// The page shows the anonymous view (login form, register link).
    LoginRequired,
    NotFound,
}

/// How to fetch the `.torrent` file once a link is known.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub url: String,
    /// POST form; `None` downloads with GET.
    pub form: Option<Vec<(String, String)>>,
    /// Cookies added on top of the session cookies.
    pub cookies: BTreeMap<String, String>,
}

impl DownloadRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Site specific part of a tracker: where the link is and how the site logs in.
///
/// Implementors are also their own settings: extra fields (quality preferences)
/// are stored next to the credentials.
#[async_trait]
pub trait Site: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Primary domain, also the registry alias.
    const ALIAS: &'static str;

    /// Charset label of pages served without one, and of login forms.
    const ENCODING: &'static str = "utf-8";

    fn mirrors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Login form description for private trackers.
    fn login_spec() -> Option<LoginSpec> {
        None
    }

    async fn download_link(&self, core: &TrackerCore, page: &Page) -> Result<LinkLookup>;

    fn page_data(&self, page: &Page) -> PageData {
        page.default_data()
    }

    fn download_request(&self, _page: &Page, link: String) -> DownloadRequest {
        DownloadRequest::get(link)
    }
}

/// Pick the first preferred quality that is available.
pub fn preferred<'a, T>(prefs: &[String], available: &'a [(String, T)]) -> Option<&'a (String, T)> {
    prefs
        .iter()
        .find_map(|pref| available.iter().find(|(quality, _)| quality == pref))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_follows_preference_order() {
        let prefs = vec!["1080p".to_string(), "720p".to_string()];
        let available = vec![("720p".to_string(), 1), ("1080p".to_string(), 2)];

        assert_eq!(preferred(&prefs, &available).map(|(_, v)| *v), Some(2));
        assert_eq!(preferred(&prefs, &available[..1]).map(|(_, v)| *v), Some(1));
        assert!(preferred(&[], &available).is_none());
    }
}
