use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;
use crate::site::{preferred, LinkLookup, Site};

static QUALITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".+\[(.+)\]").expect("valid regex"));

/// anilibria.tv, public, several encodes per release.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Anilibria {
    pub quality_prefs: Vec<String>,
}

impl Default for Anilibria {
    fn default() -> Self {
        Self {
            quality_prefs: ["HDTVRip 1080p", "HDTVRip 720p", "WEBRip 720p"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[async_trait]
impl Site for Anilibria {
    const ALIAS: &'static str = "anilibria.tv";

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        let mut available = Vec::new();
        for (label, link) in page.select_pairs(
            "div.download-torrent",
            "div.torrent-first-col > span",
            "div.torrent-fourth-col a.torrent-download-link",
        ) {
            match (QUALITY.captures(&label), link) {
                (Some(caps), Some(link)) => available.push((caps[1].to_string(), link)),
                _ => tracing::warn!("Cannot extract quality from `{}`", label),
            }
        }

        tracing::debug!(
            "Available in qualities: {}",
            available.iter().map(|(q, _)| q.as_str()).collect::<Vec<_>>().join(", ")
        );

        match preferred(&self.quality_prefs, &available) {
            Some((quality, link)) => {
                tracing::debug!("Trying to get torrent in `{}` quality ...", quality);
                Ok(LinkLookup::Found(link.clone()))
            }
            None => {
                tracing::debug!(
                    "Torrent is not available in preferred qualities: {}",
                    self.quality_prefs.join(", ")
                );
                Ok(LinkLookup::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClient, HttpConfig};

    #[tokio::test]
    async fn test_quality_preference() {
        let core = TrackerCore::new("anilibria.tv", Vec::new(), HttpClient::new(HttpConfig::default()).unwrap());
        let page = Page::new(
            "https://www.anilibria.tv/release/show.html",
            r#"
            <div class="download-torrent">
              <div class="torrent-first-col"><span>Серия 1-12 [WEBRip 720p]</span></div>
              <div class="torrent-fourth-col"><a class="torrent-download-link" href="/upload/torrents/1.torrent">dl</a></div>
            </div>
            <div class="download-torrent">
              <div class="torrent-first-col"><span>Серия 1-12 [HDTVRip 1080p]</span></div>
              <div class="torrent-fourth-col"><a class="torrent-download-link" href="/upload/torrents/2.torrent">dl</a></div>
            </div>"#,
        );

        let lookup = Anilibria::default().download_link(&core, &page).await.unwrap();
        assert_eq!(
            lookup,
            LinkLookup::Found("https://www.anilibria.tv/upload/torrents/2.torrent".into())
        );
    }
}
