use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;
use crate::site::{LinkLookup, Site};

/// rutor.org, public.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rutor {}

/// Torrent id from `/torrent/<id>/<seo-name>`.
fn torrent_id(url: &str) -> Option<&str> {
    let parts: Vec<&str> = url.trim_end_matches('/').split('/').collect();
    let last = parts.last().copied()?;
    if last.chars().all(|c| c.is_ascii_digit()) && !last.is_empty() {
        return Some(last);
    }
    parts
        .into_iter()
        .find(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[async_trait]
impl Site for Rutor {
    const ALIAS: &'static str = "rutor.org";

    fn mirrors(&self) -> Vec<String> {
        ["rutor.is", "rutor.info", "new-rutor.org"]
            .map(String::from)
            .to_vec()
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        let Some(id) = torrent_id(&page.url) else {
            return Ok(LinkLookup::NotFound);
        };
        let pattern = Regex::new(&format!("/download/{}", regex::escape(id)))
            .map_err(|e| crate::TrackerError::Parse(e.to_string()))?;
        Ok(page
            .find_link(&pattern)
            .map_or(LinkLookup::NotFound, LinkLookup::Found))
    }
}
